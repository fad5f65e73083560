use std::convert::TryFrom;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Mutex;

use ledger_apdu::APDUAnswer;

use crate::apdu::{APDUCmdVec, StatusWord};
use crate::client::Transport;
use crate::error::TransportError;

/// Transport to communicate with the Ledger Speculos simulator.
///
/// Frames are the APDU prefixed by its 4 bytes big endian length, answers carry the status word
/// after the data.
#[derive(Debug)]
pub struct TransportTcp {
    addr: SocketAddr,
    connection: Mutex<Option<TcpStream>>,
}

impl TransportTcp {
    /// Connect to the emulator listening at `addr`, for example `127.0.0.1:9999`
    pub fn new(addr: &str) -> Result<Self, TransportError> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| format!("cannot resolve {addr}"))?;
        let stream = TcpStream::connect(addr)?;
        tracing::debug!("connected to ledger emulator at {addr}");
        Ok(Self {
            addr,
            connection: Mutex::new(Some(stream)),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Transport for TransportTcp {
    fn exchange(&self, command: &APDUCmdVec) -> Result<(StatusWord, Vec<u8>), TransportError> {
        let mut connection = self.connection.lock().map_err(|_| "unable to get lock")?;
        let stream = connection.as_mut().ok_or("transport closed")?;

        let command_bytes = command.serialize();
        let mut req = vec![0u8; command_bytes.len() + 4];
        req[..4].copy_from_slice(&(command_bytes.len() as u32).to_be_bytes());
        req[4..].copy_from_slice(&command_bytes);
        stream.write_all(&req)?;

        let mut buff = [0u8; 4];
        stream.read_exact(&mut buff)?;
        let len = u32::from_be_bytes(buff);

        let mut resp = vec![0u8; len as usize + 2];
        stream.read_exact(&mut resp)?;
        let answer = APDUAnswer::from_answer(resp).map_err(|_| "Invalid Answer")?;
        Ok((
            StatusWord::try_from(answer.retcode()).unwrap_or(StatusWord::Unknown),
            answer.data().to_vec(),
        ))
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut connection = self.connection.lock().map_err(|_| "unable to get lock")?;
        if let Some(stream) = connection.take() {
            stream.shutdown(Shutdown::Both)?;
        }
        Ok(())
    }
}
