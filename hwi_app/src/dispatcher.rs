use hwi_common::bitcoin::bip32::{DerivationPath, Fingerprint};
use hwi_common::bitcoin::Psbt;
use hwi_common::{AddressType, Capability, DeviceDescriptor, DeviceType, Error, HardwareWallet};

use crate::{Backend, Config, Enumerator, Response, Session};

/// Which device a request is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Device { device_type: DeviceType, path: String },
    Fingerprint(Fingerprint),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetXpub {
        path: DerivationPath,
    },
    SignMessage {
        message: String,
        path: DerivationPath,
    },
    SignTx {
        psbt: Psbt,
    },
    DisplayAddress {
        path: DerivationPath,
        address_type: AddressType,
    },
    Setup {
        label: String,
    },
    Wipe,
    Restore {
        label: String,
    },
    Backup,
}

impl Command {
    /// The capability checked before executing, signing checks every input instead
    fn capability(&self) -> Option<Capability> {
        match self {
            Command::GetXpub { .. } => Some(Capability::GetXpub),
            Command::SignMessage { .. } => Some(Capability::SignMessage),
            Command::SignTx { .. } => None,
            Command::DisplayAddress { .. } => Some(Capability::DisplayAddress),
            Command::Setup { .. } => Some(Capability::Setup),
            Command::Wipe => Some(Capability::Wipe),
            Command::Restore { .. } => Some(Capability::Restore),
            Command::Backup => Some(Capability::Backup),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub target: Target,
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Resolving,
    Connected,
    Executing,
    Closed,
}

/// Runs a single request: find the device, open it, execute the command and close it.
///
/// The session is closed whatever the outcome, and exactly one result is returned.
pub struct Dispatcher<'a, B: ?Sized> {
    backend: &'a B,
    config: &'a Config,
    state: State,
}

impl<'a, B: Backend + ?Sized> Dispatcher<'a, B> {
    pub fn new(backend: &'a B, config: &'a Config) -> Self {
        Self {
            backend,
            config,
            state: State::Idle,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn transition(&mut self, to: State) {
        tracing::debug!("{:?} -> {:?}", self.state, to);
        self.state = to;
    }

    /// The connected devices, with their fingerprint if the config asks for it
    pub fn enumerate(&self) -> Vec<DeviceDescriptor> {
        let enumerator = Enumerator::new(self.backend);
        if self.config.fingerprints {
            enumerator.devices_with_fingerprint(self.config.allow_untested)
        } else {
            enumerator.devices()
        }
    }

    pub fn dispatch(&mut self, request: Request) -> Result<Response, Error> {
        self.transition(State::Resolving);
        let session = match self.resolve(&request.target) {
            Ok(descriptor) => Session::open(self.backend, descriptor, self.config.allow_untested),
            Err(e) => Err(e),
        };
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                self.transition(State::Closed);
                return Err(e);
            }
        };
        self.transition(State::Connected);

        let result = self.execute(&session, request.command);
        let closed = session.close();
        self.transition(State::Closed);

        let response = result?;
        closed?;
        Ok(response)
    }

    fn resolve(&self, target: &Target) -> Result<DeviceDescriptor, Error> {
        let enumerator = Enumerator::new(self.backend);
        match target {
            Target::Device { device_type, path } => enumerator.find(*device_type, path),
            Target::Fingerprint(fingerprint) => {
                enumerator.find_by_fingerprint(*fingerprint, self.config.allow_untested)
            }
        }
    }

    fn execute(&mut self, session: &Session, command: Command) -> Result<Response, Error> {
        let handle = session.handle();
        match (&command, command.capability()) {
            (Command::SignTx { psbt }, _) => {
                handle.check_psbt(psbt)?;
            }
            (_, Some(capability)) => handle.check(capability)?,
            (_, None) => (),
        }
        self.transition(State::Executing);

        // checked above
        let device = handle.device();
        Ok(match command {
            Command::GetXpub { path } => Response::Xpub {
                xpub: device.get_extended_pubkey(&path)?.to_string(),
            },
            Command::SignMessage { message, path } => Response::Signature {
                signature: device.sign_message(&message, &path)?.to_base64(),
            },
            Command::SignTx { mut psbt } => {
                let added = device.sign_psbt(&mut psbt)?;
                tracing::debug!("{added} signatures added");
                Response::Psbt {
                    psbt: psbt.to_string(),
                }
            }
            Command::DisplayAddress { path, address_type } => Response::Address {
                address: device.display_address(&path, address_type)?,
            },
            Command::Setup { label } => {
                device.setup(&label, &self.config.password)?;
                Response::success()
            }
            Command::Wipe => {
                device.wipe()?;
                Response::success()
            }
            Command::Restore { label } => {
                device.restore(&label)?;
                Response::success()
            }
            Command::Backup => Response::Success {
                success: true,
                message: Some(device.backup()?),
            },
        })
    }
}
