use super::{Transport, TransportKind};
use crate::error::TransportError;
use async_trait::async_trait;

/// The host's command-evaluation entry point.
///
/// Implemented by whatever embeds the interpreter: the PTY host in the CLI,
/// or a recording double in tests.
pub trait EvalHook: Send {
    fn eval(&mut self, script: &[u8]) -> Result<(), TransportError>;
}

/// Sends commands through an [`EvalHook`] borrowed for the duration of one
/// host poll.
pub struct InterpreterTransport<'a> {
    host: Option<&'a mut dyn EvalHook>,
}

impl<'a> InterpreterTransport<'a> {
    pub fn new(host: &'a mut dyn EvalHook) -> Self {
        Self { host: Some(host) }
    }
}

#[async_trait]
impl<'a> Transport for InterpreterTransport<'a> {
    fn kind(&self) -> TransportKind {
        TransportKind::Interpreter
    }

    async fn send(&mut self, command: &[u8]) -> Result<(), TransportError> {
        let host = self.host.as_mut().ok_or(TransportError::HostUnavailable)?;
        host.eval(command)
    }

    async fn shutdown(&mut self) {
        self.host = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<Vec<u8>>);

    impl EvalHook for Recorder {
        fn eval(&mut self, script: &[u8]) -> Result<(), TransportError> {
            self.0.push(script.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_reaches_hook() {
        let mut recorder = Recorder(Vec::new());
        {
            let mut transport = InterpreterTransport::new(&mut recorder);
            transport.send(b"echo \"hi\" status").await.unwrap();
        }
        assert_eq!(recorder.0, vec![b"echo \"hi\" status".to_vec()]);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let mut recorder = Recorder(Vec::new());
        let mut transport = InterpreterTransport::new(&mut recorder);
        assert_eq!(transport.kind(), TransportKind::Interpreter);
        transport.shutdown().await;
        assert_eq!(
            transport.send(b"echo x").await,
            Err(TransportError::HostUnavailable)
        );
    }
}
