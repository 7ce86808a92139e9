// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Exercises `handler::send_with_retry` directly against a scripted host,
//! bypassing the actor entirely, so the retry/backoff procedure (spec
//! §4.7) can be tested without a full mock network.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ant_kad::config::Config;
use ant_kad::error::{KadError, TransportError};
use ant_kad::handler::send_with_retry;
use ant_kad::host::{Host, Stream};
use ant_kad::protocol::{MessageType, WireMessage, PROTOCOL_ID};
use async_trait::async_trait;
use bytes::Bytes;
use libp2p_identity::PeerId;

/// A host whose `open_stream` replays a fixed script of outcomes, one
/// per call: `Err` entries fail the attempt, `Ok` entries succeed and
/// reply with a `Ping` response.
struct ScriptedHost {
    id: PeerId,
    script: Mutex<Vec<Result<(), TransportError>>>,
    attempts: AtomicU32,
}

impl ScriptedHost {
    fn new(script: Vec<Result<(), TransportError>>) -> Self {
        Self {
            id: PeerId::random(),
            script: Mutex::new(script),
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Host for ScriptedHost {
    fn id(&self) -> PeerId {
        self.id
    }

    async fn open_stream(&self, _peer: PeerId, _protocol_ids: &[&str], _timeout: Duration) -> Result<Box<dyn Stream>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().expect("lock poisoned");
        if script.is_empty() {
            return Ok(Box::new(SucceedingStream));
        }
        match script.remove(0) {
            Ok(()) => Ok(Box::new(SucceedingStream)),
            Err(e) => Err(e),
        }
    }
}

struct SucceedingStream;

#[async_trait]
impl Stream for SucceedingStream {
    async fn write(&mut self, _bytes: Bytes) -> Result<(), TransportError> {
        Ok(())
    }

    async fn read(&mut self) -> Result<Bytes, TransportError> {
        let bytes = WireMessage::new(MessageType::Ping).encode().expect("encode");
        Ok(Bytes::from(bytes))
    }

    async fn close(&mut self) {}
}

/// A stream whose reply carries no `type` tag, so `WireMessage::decode`
/// fails and the handler wraps that as `TransportError::Other`.
struct GarbledResponseStream;

#[async_trait]
impl Stream for GarbledResponseStream {
    async fn write(&mut self, _bytes: Bytes) -> Result<(), TransportError> {
        Ok(())
    }

    async fn read(&mut self) -> Result<Bytes, TransportError> {
        Ok(Bytes::from_static(&[0xFF, 0xFF, 0xFF]))
    }

    async fn close(&mut self) {}
}

struct AlwaysGarbledHost {
    id: PeerId,
    attempts: AtomicU32,
}

#[async_trait]
impl Host for AlwaysGarbledHost {
    fn id(&self) -> PeerId {
        self.id
    }

    async fn open_stream(&self, _peer: PeerId, _protocol_ids: &[&str], _timeout: Duration) -> Result<Box<dyn Stream>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(GarbledResponseStream))
    }
}

fn retry_config() -> Config {
    let mut config = Config::new();
    config.network_timeout = Duration::from_millis(200);
    config.max_retry_attempts = 2;
    config.retry_initial_backoff = Duration::from_millis(1);
    config.retry_max_backoff = Duration::from_millis(5);
    config
}

#[tokio::test]
async fn fails_once_then_succeeds_on_retry() {
    let host = ScriptedHost::new(vec![Err(TransportError::ConnectionReset)]);
    let peer = PeerId::random();
    let msg = WireMessage::new(MessageType::Ping);

    let response = send_with_retry(&host, peer, &msg, &retry_config()).await.expect("must succeed on the second attempt");

    assert!(response.is_some());
    assert_eq!(host.attempts.load(Ordering::SeqCst), 2, "expected exactly one failure followed by one success");
}

#[tokio::test]
async fn exhausts_retries_and_surfaces_the_last_cause() {
    let host = ScriptedHost::new(vec![
        Err(TransportError::ConnectionReset),
        Err(TransportError::ConnectionReset),
    ]);
    let peer = PeerId::random();
    let msg = WireMessage::new(MessageType::Ping);

    let err = send_with_retry(&host, peer, &msg, &retry_config()).await.expect_err("every scripted attempt fails");

    match err {
        KadError::MaxRetriesExceeded { attempts, cause } => {
            assert_eq!(attempts, 2);
            assert_eq!(cause, TransportError::ConnectionReset);
        }
        other => panic!("expected MaxRetriesExceeded, got {other:?}"),
    }
    assert_eq!(host.attempts.load(Ordering::SeqCst), 2, "must not attempt more than max_retry_attempts");
}

#[tokio::test]
async fn self_dial_is_rejected_without_touching_the_host() {
    let host = ScriptedHost::new(vec![]);
    let msg = WireMessage::new(MessageType::Ping);

    let err = send_with_retry(&host, host.id(), &msg, &retry_config()).await.expect_err("dialing self must fail");

    assert!(matches!(err, KadError::Transport(TransportError::SelfDial)));
    assert_eq!(host.attempts.load(Ordering::SeqCst), 0, "self-dial must be rejected before any stream is opened");
}

#[tokio::test]
async fn a_malformed_response_is_not_retried() {
    let host = AlwaysGarbledHost {
        id: PeerId::random(),
        attempts: AtomicU32::new(0),
    };
    let peer = PeerId::random();
    let msg = WireMessage::new(MessageType::Ping);

    let err = send_with_retry(&host, peer, &msg, &retry_config()).await.expect_err("a garbled response must not decode");

    match err {
        KadError::MaxRetriesExceeded { attempts, cause } => {
            assert_eq!(attempts, 1, "a protocol-level failure must not be retried");
            assert!(matches!(cause, TransportError::Other(_)));
        }
        other => panic!("expected MaxRetriesExceeded, got {other:?}"),
    }
    assert_eq!(host.attempts.load(Ordering::SeqCst), 1, "must stop after the first attempt");
}

#[test]
fn protocol_id_is_the_amino_kad_identifier() {
    assert_eq!(PROTOCOL_ID, "/ipfs/kad/1.0.0");
}
