//! Credential provisioning handshake as a sans-IO state machine
//!
//! [`Provisioner`] tells the caller what to do next ([`Action`]) and is fed
//! the outcome of each GATT operation. It never touches a transport, so the
//! driver decides how writes and reads are performed and how long they may
//! take.

use std::collections::VecDeque;
use std::fmt;

use crate::ble::{FRAMING_OVERHEAD, STATUS_ACK, commands, prefixes};

/// Handshake stages, in the order the device expects them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    CleanList,
    ChangeModeWifi,
    Start,
    SendSsid,
    SendPassword,
    SendTokenChunks,
    ConfirmCredentials,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::CleanList,
        Stage::ChangeModeWifi,
        Stage::Start,
        Stage::SendSsid,
        Stage::SendPassword,
        Stage::SendTokenChunks,
        Stage::ConfirmCredentials,
    ];

    pub const FIRST: Stage = Stage::CleanList;

    pub fn name(self) -> &'static str {
        match self {
            Stage::CleanList => "CleanList",
            Stage::ChangeModeWifi => "ChangeModeWifi",
            Stage::Start => "Start",
            Stage::SendSsid => "SendSsid",
            Stage::SendPassword => "SendPassword",
            Stage::SendTokenChunks => "SendTokenChunks",
            Stage::ConfirmCredentials => "ConfirmCredentials",
        }
    }

    /// Stage that follows this one, `None` after ConfirmCredentials
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::CleanList => Some(Stage::ChangeModeWifi),
            Stage::ChangeModeWifi => Some(Stage::Start),
            Stage::Start => Some(Stage::SendSsid),
            Stage::SendSsid => Some(Stage::SendPassword),
            Stage::SendPassword => Some(Stage::SendTokenChunks),
            Stage::SendTokenChunks => Some(Stage::ConfirmCredentials),
            Stage::ConfirmCredentials => None,
        }
    }

    /// Whether the device answers this stage with a status byte.
    ///
    /// The device stays silent after the SSID write.
    pub fn expects_ack(self) -> bool {
        !matches!(self, Stage::SendSsid)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected status code {observed} at provisioning stage {stage} (expected {expected})")]
    UnexpectedStatus { stage: Stage, observed: u8, expected: u8 },
    #[error("{event} received at stage {stage} while the handshake expected {expected}")]
    OutOfOrder {
        stage: Stage,
        event: &'static str,
        expected: &'static str,
    },
    #[error("handshake already finished")]
    Finished,
}

impl ProtocolError {
    /// Stage the handshake was in when it failed
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ProtocolError::UnexpectedStatus { stage, .. } | ProtocolError::OutOfOrder { stage, .. } => {
                Some(*stage)
            }
            ProtocolError::Finished => None,
        }
    }

    /// Status byte the device actually sent, for status mismatches
    pub fn observed(&self) -> Option<u8> {
        match self {
            ProtocolError::UnexpectedStatus { observed, .. } => Some(*observed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("MTU {mtu} leaves no room for a token chunk ({FRAMING_OVERHEAD} bytes of overhead)")]
    MtuTooSmall { mtu: usize },
}

/// One-byte command payload
pub fn command(cmd: u8) -> Vec<u8> {
    vec![cmd]
}

/// Prefix + text, UTF-8 encoded
pub fn prefixed(prefix: &str, text: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(prefix.len() + text.len());
    buf.extend_from_slice(prefix.as_bytes());
    buf.extend_from_slice(text.as_bytes());
    buf
}

/// Largest token chunk (in bytes, without prefix) a write may carry
pub fn token_chunk_size(mtu: usize) -> Result<usize, EncodeError> {
    match mtu.checked_sub(FRAMING_OVERHEAD) {
        Some(size) if size > 0 => Ok(size),
        _ => Err(EncodeError::MtuTooSmall { mtu }),
    }
}

/// Split `token` into pieces of at most `max_bytes` bytes each.
///
/// Pieces never split a UTF-8 sequence, so a piece can be shorter than
/// `max_bytes`; a single character wider than `max_bytes` becomes its own
/// piece. An empty token yields no pieces.
pub fn chunk_token(token: &str, max_bytes: usize) -> Vec<&str> {
    let max_bytes = max_bytes.max(1);
    let mut chunks = Vec::with_capacity(token.len() / max_bytes + 1);
    let mut rest = token;

    while !rest.is_empty() {
        let mut end = max_bytes.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }

    chunks
}

/// What the driver must do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    /// Write these bytes to the provisioning characteristic
    Write(&'a [u8]),
    /// Read one status byte from the provisioning characteristic
    ReadStatus,
    /// Handshake finished, the device is provisioned
    Done,
}

#[derive(Debug)]
enum State {
    Writing(VecDeque<Vec<u8>>),
    AwaitingStatus,
    Done,
    Failed,
}

/// Drives a single provisioning attempt.
///
/// A failed attempt cannot be resumed; create a new `Provisioner` to start
/// again from CleanList.
#[derive(Debug)]
pub struct Provisioner {
    stage: Stage,
    state: State,
    last_status: Option<u8>,
    ssid: Vec<u8>,
    password: Vec<u8>,
    token_chunks: Vec<Vec<u8>>,
}

impl Provisioner {
    pub fn new(ssid: &str, password: &str, token: &str, mtu: usize) -> Result<Self, EncodeError> {
        let chunk_size = token_chunk_size(mtu)?;
        let token_chunks = chunk_token(token, chunk_size)
            .into_iter()
            .map(|chunk| prefixed(prefixes::TOKEN, chunk))
            .collect();

        let mut provisioner = Self {
            stage: Stage::FIRST,
            state: State::Done,
            last_status: None,
            ssid: prefixed(prefixes::SSID, ssid),
            password: prefixed(prefixes::PASSWORD, password),
            token_chunks,
        };
        provisioner.enter(Stage::FIRST);
        Ok(provisioner)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn last_status(&self) -> Option<u8> {
        self.last_status
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Number of token writes the SendTokenChunks stage performs
    pub fn token_chunk_count(&self) -> usize {
        self.token_chunks.len()
    }

    pub fn next_action(&self) -> Result<Action<'_>, ProtocolError> {
        match &self.state {
            State::Writing(pending) => match pending.front() {
                Some(payload) => Ok(Action::Write(payload)),
                None => Ok(Action::ReadStatus),
            },
            State::AwaitingStatus => Ok(Action::ReadStatus),
            State::Done => Ok(Action::Done),
            State::Failed => Err(ProtocolError::Finished),
        }
    }

    /// Record that the payload returned by [`next_action`](Self::next_action) was written
    pub fn written(&mut self) -> Result<(), ProtocolError> {
        let pending = match &mut self.state {
            State::Writing(pending) if !pending.is_empty() => pending,
            State::Done | State::Failed => return Err(ProtocolError::Finished),
            _ => {
                return Err(ProtocolError::OutOfOrder {
                    stage: self.stage,
                    event: "write",
                    expected: "status read",
                });
            }
        };

        pending.pop_front();
        if !pending.is_empty() {
            return Ok(());
        }

        if self.stage.expects_ack() {
            self.state = State::AwaitingStatus;
        } else {
            self.advance();
        }
        Ok(())
    }

    /// Feed the status byte read after a stage's writes
    pub fn status_received(&mut self, status: u8) -> Result<(), ProtocolError> {
        match &self.state {
            State::AwaitingStatus => {}
            State::Writing(pending) if pending.is_empty() => {}
            State::Writing(_) => {
                return Err(ProtocolError::OutOfOrder {
                    stage: self.stage,
                    event: "status",
                    expected: "write",
                });
            }
            State::Done | State::Failed => return Err(ProtocolError::Finished),
        }

        self.last_status = Some(status);
        if status != STATUS_ACK {
            self.state = State::Failed;
            return Err(ProtocolError::UnexpectedStatus {
                stage: self.stage,
                observed: status,
                expected: STATUS_ACK,
            });
        }

        self.advance();
        Ok(())
    }

    fn advance(&mut self) {
        match self.stage.next() {
            Some(next) => self.enter(next),
            None => self.state = State::Done,
        }
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        let payloads: VecDeque<Vec<u8>> = match stage {
            Stage::CleanList => [command(commands::CLEAN_LIST)].into(),
            Stage::ChangeModeWifi => [command(commands::CHANGE_MODE_WIFI)].into(),
            Stage::Start => [command(commands::START)].into(),
            Stage::SendSsid => [self.ssid.clone()].into(),
            Stage::SendPassword => [self.password.clone()].into(),
            Stage::SendTokenChunks => self.token_chunks.iter().cloned().collect(),
            Stage::ConfirmCredentials => [command(commands::CRED_CONFIRM)].into(),
        };

        self.state = if payloads.is_empty() {
            State::AwaitingStatus
        } else {
            State::Writing(payloads)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::DEFAULT_MTU_SIZE;

    /// Runs a provisioner to completion, answering every status read with
    /// `status_for(stage)`. Returns the operations performed.
    fn run(
        provisioner: &mut Provisioner,
        status_for: impl Fn(Stage) -> u8,
    ) -> (Vec<(Stage, Option<Vec<u8>>)>, Result<(), ProtocolError>) {
        let mut log = Vec::new();
        loop {
            let stage = provisioner.stage();
            let action = match provisioner.next_action() {
                Ok(action) => action,
                Err(e) => return (log, Err(e)),
            };
            match action {
                Action::Write(bytes) => {
                    log.push((stage, Some(bytes.to_vec())));
                    provisioner.written().unwrap();
                }
                Action::ReadStatus => {
                    log.push((stage, None));
                    if let Err(e) = provisioner.status_received(status_for(stage)) {
                        return (log, Err(e));
                    }
                }
                Action::Done => return (log, Ok(())),
            }
        }
    }

    #[test]
    fn stage_order_is_fixed() {
        let mut stage = Stage::FIRST;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen, Stage::ALL);
    }

    #[test]
    fn full_handshake_writes_expected_bytes() {
        let mut p = Provisioner::new("home", "secret", "tok", DEFAULT_MTU_SIZE).unwrap();
        let (log, result) = run(&mut p, |_| STATUS_ACK);
        assert_eq!(result, Ok(()));
        assert!(p.is_done());

        assert_eq!(
            log,
            vec![
                (Stage::CleanList, Some(vec![0x05])),
                (Stage::CleanList, None),
                (Stage::ChangeModeWifi, Some(vec![0x01])),
                (Stage::ChangeModeWifi, None),
                (Stage::Start, Some(vec![0x02])),
                (Stage::Start, None),
                (Stage::SendSsid, Some(b"0home".to_vec())),
                (Stage::SendPassword, Some(b"1secret".to_vec())),
                (Stage::SendPassword, None),
                (Stage::SendTokenChunks, Some(b"2tok".to_vec())),
                (Stage::SendTokenChunks, None),
                (Stage::ConfirmCredentials, Some(vec![0x03])),
                (Stage::ConfirmCredentials, None),
            ]
        );
    }

    #[test]
    fn ssid_stage_never_reads_status() {
        let mut p = Provisioner::new("ssid", "pw", "token", DEFAULT_MTU_SIZE).unwrap();
        let (log, _) = run(&mut p, |_| STATUS_ACK);
        assert!(!log.contains(&(Stage::SendSsid, None)));
        for stage in Stage::ALL.into_iter().filter(|s| s.expects_ack()) {
            assert_eq!(log.iter().filter(|op| **op == (stage, None)).count(), 1, "{stage}");
        }
    }

    #[test]
    fn token_chunks_share_one_status_read() {
        let token = "x".repeat(1200);
        let mut p = Provisioner::new("ssid", "pw", &token, DEFAULT_MTU_SIZE).unwrap();
        assert_eq!(p.token_chunk_count(), 3);

        let (log, result) = run(&mut p, |_| STATUS_ACK);
        assert!(result.is_ok());
        let token_ops: Vec<_> = log
            .iter()
            .filter(|(stage, _)| *stage == Stage::SendTokenChunks)
            .collect();
        assert_eq!(token_ops.len(), 4);
        assert_eq!(token_ops[0].1.as_ref().unwrap().len(), 501);
        assert_eq!(token_ops[1].1.as_ref().unwrap().len(), 501);
        assert_eq!(token_ops[2].1.as_ref().unwrap().len(), 201);
        assert_eq!(token_ops[3].1, None);
        for (_, bytes) in &token_ops[..3] {
            assert_eq!(bytes.as_ref().unwrap()[0], b'2');
        }
    }

    #[test]
    fn unexpected_status_aborts_at_change_mode() {
        let mut p = Provisioner::new("ssid", "pw", "token", DEFAULT_MTU_SIZE).unwrap();
        let (log, result) = run(&mut p, |stage| {
            if stage == Stage::ChangeModeWifi { 5 } else { STATUS_ACK }
        });

        let err = result.unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnexpectedStatus {
                stage: Stage::ChangeModeWifi,
                observed: 5,
                expected: STATUS_ACK
            }
        );
        assert_eq!(err.stage(), Some(Stage::ChangeModeWifi));
        assert_eq!(err.observed(), Some(5));
        assert_eq!(log.last(), Some(&(Stage::ChangeModeWifi, None)));
        assert_eq!(p.last_status(), Some(5));
        assert_eq!(p.next_action(), Err(ProtocolError::Finished));
        assert_eq!(p.written(), Err(ProtocolError::Finished));
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        let mut p = Provisioner::new("ssid", "pw", "token", DEFAULT_MTU_SIZE).unwrap();
        assert!(matches!(
            p.status_received(STATUS_ACK),
            Err(ProtocolError::OutOfOrder { stage: Stage::CleanList, .. })
        ));
        p.written().unwrap();
        assert!(matches!(
            p.written(),
            Err(ProtocolError::OutOfOrder { stage: Stage::CleanList, .. })
        ));
        p.status_received(STATUS_ACK).unwrap();
        assert_eq!(p.stage(), Stage::ChangeModeWifi);
    }

    #[test]
    fn empty_token_still_reads_token_status() {
        let mut p = Provisioner::new("ssid", "pw", "", DEFAULT_MTU_SIZE).unwrap();
        let (log, result) = run(&mut p, |_| STATUS_ACK);
        assert!(result.is_ok());
        let token_ops: Vec<_> = log
            .iter()
            .filter(|(stage, _)| *stage == Stage::SendTokenChunks)
            .collect();
        assert_eq!(token_ops, vec![&(Stage::SendTokenChunks, None)]);
    }

    #[test]
    fn mtu_must_exceed_overhead() {
        assert_eq!(token_chunk_size(512), Ok(500));
        assert_eq!(token_chunk_size(13), Ok(1));
        assert_eq!(token_chunk_size(12), Err(EncodeError::MtuTooSmall { mtu: 12 }));
        assert!(Provisioner::new("s", "p", "t", 4).is_err());
    }

    #[test]
    fn chunks_reassemble_to_original() {
        let size = 500;
        for len in [0, 1, size - 1, size, size + 1, size * 3, size * 3 + 7] {
            let token: String = (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect();
            let chunks = chunk_token(&token, size);
            assert_eq!(chunks.concat(), token, "len {len}");
            assert_eq!(chunks.len(), len.div_ceil(size), "len {len}");
            assert!(chunks.iter().all(|c| c.len() <= size));
        }
    }

    #[test]
    fn chunks_respect_utf8_boundaries() {
        let token = "aé€b€";
        let chunks = chunk_token(token, 3);
        assert_eq!(chunks, vec!["aé", "€", "b", "€"]);
        assert_eq!(chunk_token("€", 1), vec!["€"]);
    }

    #[test]
    fn encoding_helpers() {
        assert_eq!(command(commands::CLEAN_LIST), vec![5]);
        assert_eq!(prefixed(prefixes::PASSWORD, "pä"), vec![b'1', b'p', 0xc3, 0xa4]);
    }
}
