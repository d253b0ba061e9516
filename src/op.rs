//! Replicated command envelope.
//!
//! An [`Op`] is the unit of work submitted through the RSM: a numeric type,
//! a version, and an opaque payload. [`OpFactory`] lets a replica that did
//! not originate an op reconstruct one from the bytes it reads off the
//! replicated log.

use crate::error::{Error, Result};
use crate::rsm::Rsm;

/// The wire format of a single log entry: `u32 op_type | i32 version |
/// payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpEnvelope {
    /// Numeric operation type, stable per service (Deva: 1..100, Manusya:
    /// 100..200).
    pub op_type: u32,
    /// Payload schema version, allowing forward-compatible evolution.
    pub version: i32,
    /// Opaque, op-specific payload bytes.
    pub payload: Vec<u8>,
}

impl OpEnvelope {
    /// Encode `(op_type, version, payload)` into the wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.payload.len());
        buf.extend_from_slice(&self.op_type.to_be_bytes());
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a log entry back into `(op_type, version, payload)`.
    ///
    /// Failure here is a contract failure: the replicated log is
    /// corrupted, and the caller (`Rsm::on_apply`) must abort the replica
    /// rather than attempt to continue applying a desynchronized log.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 {
            return Err(Error::internal("log entry shorter than the 8-byte op header"));
        }
        let op_type = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let version = i32::from_be_bytes(buf[4..8].try_into().unwrap());
        Ok(Self { op_type, version, payload: buf[8..].to_vec() })
    }
}

/// A single replicated command, decoded and ready to apply.
///
/// Mirrors `pain::common::Op`: `op_type` identifies the command,
/// `on_apply` is invoked once the command is known to be committed (at
/// `log_index` 0 for read-only ops that never touch the log), and
/// `on_finish` delivers the result back to whichever completion channel
/// the originator attached.
pub trait Op: Send {
    /// This op's numeric type.
    fn op_type(&self) -> u32;

    /// Called once the op is committed (or, for read-only ops, called
    /// immediately with `log_index = 0`). Implementations call
    /// `Container::process` and forward the result to `on_finish`.
    fn on_apply(&mut self, log_index: u64);

    /// Deliver the result of `process` to the op's completion channel, if
    /// any. Called by `on_apply`; exposed separately so `ContainerOp` can
    /// be tested without an `Rsm`.
    fn on_finish(&mut self, status: Result<Vec<u8>>);

    /// Entry point invoked on the replica that originated this op, once it
    /// has been built from a caller's request. A mutating op submits
    /// itself through `rsm` for replication (rejected if `rsm` does not
    /// believe itself leader); a read-only op calls `on_apply(0)`
    /// directly via `rsm.apply_local`, since it never needs to touch the
    /// log.
    fn apply(self: Box<Self>, rsm: &Rsm) -> Result<()>;
}

/// Reconstructs an [`Op`] from a replicated log entry, so any replica can
/// apply a command it did not originate.
///
/// Each service (Deva, Manusya) implements its own factory over its own
/// numeric op-type space.
pub trait OpFactory: Send + Sync {
    /// Build a fresh `Op` for `(op_type, version)`, primed with the
    /// decoded `payload`. Returns an error only for an unknown
    /// `(op_type, version)` pair — a condition the caller must treat as a
    /// fatal, replica-halting decode failure.
    fn create(&self, op_type: u32, version: i32, payload: &[u8]) -> Result<Box<dyn Op>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips() {
        let env = OpEnvelope { op_type: 7, version: 1, payload: vec![1, 2, 3] };
        let decoded = OpEnvelope::decode(&env.encode()).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn decode_rejects_truncated_header() {
        assert!(OpEnvelope::decode(&[0u8; 4]).is_err());
    }

    #[test]
    fn decode_accepts_empty_payload() {
        let env = OpEnvelope { op_type: 1, version: 0, payload: vec![] };
        let decoded = OpEnvelope::decode(&env.encode()).unwrap();
        assert_eq!(decoded.payload, Vec::<u8>::new());
    }
}
