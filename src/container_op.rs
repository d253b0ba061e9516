//! Bridges a typed request/response pair to the untyped [`Op`] trait.
//!
//! `ContainerOp<C, Req, Resp>` is constructed by a service's `OpFactory`
//! from a decoded payload, and, once `on_apply` runs, calls
//! `Container::process` and stashes the encoded response so `on_finish`
//! can be delivered.

use tokio::sync::oneshot::Sender;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::op::Op;
use crate::rsm::Rsm;

/// A deterministic state machine driven entirely by committed ops.
///
/// Every replica applies the same sequence of `process` calls and must
/// reach the same state; `save_snapshot`/`load_snapshot` let the RSM
/// truncate the log behind a compacted checkpoint.
pub trait Container: Send + Sync {
    /// Apply one decoded op payload and return its encoded response.
    /// `op_type` selects how `payload` is interpreted; `log_index` is the
    /// index this op was committed at (0 for a read-only op applied
    /// outside the log).
    fn process(&self, op_type: u32, payload: &[u8], log_index: u64) -> Result<Vec<u8>>;

    /// Serialize the entire state into a snapshot byte blob.
    fn save_snapshot(&self) -> Result<Vec<u8>>;

    /// Replace the entire state with the one encoded in `snapshot`.
    fn load_snapshot(&self, snapshot: &[u8]) -> Result<()>;
}

/// Binds a request type `Req` and response type `Resp` to a numeric op
/// type against some `Container` `C`, and carries the one-shot channel
/// that returns the response to whoever submitted the op.
pub struct ContainerOp<Req, Resp> {
    op_type: u32,
    request: Req,
    responder: Option<Sender<Result<Resp>>>,
    container: std::sync::Arc<dyn Container>,
    decode: fn(&[u8]) -> Result<Resp>,
    // Read-only ops apply locally and never touch the replicated log.
    mutating: bool,
}

impl<Req, Resp> ContainerOp<Req, Resp>
where
    Req: Serialize + DeserializeOwned + Send,
    Resp: Serialize + DeserializeOwned + Send,
{
    /// Construct a `ContainerOp` ready to be boxed as a `dyn Op`.
    pub fn new(
        op_type: u32,
        request: Req,
        container: std::sync::Arc<dyn Container>,
        responder: Option<Sender<Result<Resp>>>,
        mutating: bool,
    ) -> Self {
        Self { op_type, request, responder, container, decode: |bytes| Ok(bincode::deserialize(bytes)?), mutating }
    }

    fn encoded_request(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.request)?)
    }
}

impl<Req, Resp> Op for ContainerOp<Req, Resp>
where
    Req: Serialize + DeserializeOwned + Send + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
{
    fn op_type(&self) -> u32 {
        self.op_type
    }

    fn on_apply(&mut self, log_index: u64) {
        let result = self
            .encoded_request()
            .and_then(|payload| self.container.process(self.op_type, &payload, log_index))
            .and_then(|bytes| (self.decode)(&bytes));
        self.on_finish(result.map(|resp| bincode::serialize(&resp).unwrap_or_default()));
    }

    fn on_finish(&mut self, status: Result<Vec<u8>>) {
        if let Some(tx) = self.responder.take() {
            let decoded = status.and_then(|bytes| (self.decode)(&bytes));
            let _ = tx.send(decoded);
        }
    }

    fn apply(self: Box<Self>, rsm: &Rsm) -> Result<()> {
        if !self.mutating {
            rsm.apply_local(self);
            return Ok(());
        }
        let op_type = self.op_type;
        let payload = self.encoded_request()?;
        rsm.apply(op_type, 0, payload, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Echo(String);

    struct EchoContainer;
    impl Container for EchoContainer {
        fn process(&self, _op_type: u32, payload: &[u8], _log_index: u64) -> Result<Vec<u8>> {
            Ok(payload.to_vec())
        }
        fn save_snapshot(&self) -> Result<Vec<u8>> {
            Ok(vec![])
        }
        fn load_snapshot(&self, _snapshot: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn on_apply_round_trips_request_to_response() {
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let mut op: ContainerOp<Echo, Echo> =
            ContainerOp::new(1, Echo("hi".into()), std::sync::Arc::new(EchoContainer), Some(tx), true);
        op.on_apply(5);
        let resp = rx.try_recv().unwrap().unwrap();
        assert_eq!(resp.0, "hi");
    }
}
