#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::json;
use taptpos::{
    config::{keys, ConfigStore, MemoryStore},
    reader::{
        Device, DeviceError, DiscoveryConfig, DiscoveryUpdate, PaymentIntent,
        PaymentIntentStatus, Reader, ReaderConnectConfig,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
    task::JoinHandle,
};

pub fn init_log() {
    let _ = pretty_env_logger::try_init();
}

pub fn reader(serial: &str) -> Reader {
    Reader {
        serial_number: serial.to_string(),
        device_type: "mock".to_string(),
        location_id: None,
        simulated: true,
    }
}

/// Answer one http request with a canned response, returning the raw request head.
pub async fn respond_once(status: &'static str, body: &'static str) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
        }

        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;

        String::from_utf8_lossy(&request).to_lowercase()
    });

    (addr, handle)
}

pub fn paired_store(origin: &str) -> Arc<MemoryStore> {
    let store = MemoryStore::default();
    store
        .set_all(vec![
            (keys::ORIGIN, json!(origin)),
            (keys::TENANT_ID, json!("tp1")),
            (keys::BEARER, json!("tok")),
            (keys::LOCATION_ID, json!("tml_1")),
            (keys::SIMULATED, json!(true)),
        ])
        .unwrap();
    Arc::new(store)
}

#[derive(Debug, Clone)]
pub enum Connect {
    /// connect succeeds
    Succeed,
    /// connect fails, nothing connected
    Fail(DeviceError),
    /// device connects the reader but the connect call still fails
    FailButConnected(DeviceError),
    /// connect never resolves, the device connects by itself after the delay
    HangThenConnect(Duration),
    /// connect never resolves
    Hang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Retrieve,
    Collect,
    Confirm,
}

#[derive(Debug)]
struct Script {
    updates: Vec<DiscoveryUpdate>,
    keep_discovery_open: bool,
    connect: Connect,
    fail_at: Option<(Step, DeviceError)>,
    confirmed_id: Option<String>,
}

/// Scripted device capability recording every call.
#[derive(Debug)]
pub struct MockDevice {
    connected: Arc<Mutex<Option<Reader>>>,
    script: Mutex<Script>,
    discovery_tx: Mutex<Vec<mpsc::UnboundedSender<DiscoveryUpdate>>>,
    calls: Mutex<Vec<String>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            connected: Arc::new(Mutex::new(None)),
            script: Mutex::new(Script {
                updates: Vec::new(),
                keep_discovery_open: false,
                connect: Connect::Succeed,
                fail_at: None,
                confirmed_id: None,
            }),
            discovery_tx: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockDevice {
    pub fn already_connected() -> Self {
        let device = Self::default();
        *device.connected.lock().unwrap() = Some(reader("r0"));
        device
    }

    pub fn discovering(updates: Vec<DiscoveryUpdate>) -> Self {
        let device = Self::default();
        device.script.lock().unwrap().updates = updates;
        device
    }

    pub fn keep_discovery_open(self) -> Self {
        self.script.lock().unwrap().keep_discovery_open = true;
        self
    }

    pub fn connect_with(self, connect: Connect) -> Self {
        self.script.lock().unwrap().connect = connect;
        self
    }

    pub fn fail_at(self, step: Step, err: DeviceError) -> Self {
        self.script.lock().unwrap().fail_at = Some((step, err));
        self
    }

    pub fn confirm_without_id(self) -> Self {
        self.script.lock().unwrap().confirmed_id = Some(String::new());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == name).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn step(&self, step: Step, name: &str, intent: PaymentIntent) -> Result<PaymentIntent, DeviceError> {
        self.record(name);

        let script = self.script.lock().unwrap();
        if let Some((failing, err)) = &script.fail_at {
            if *failing == step {
                return Err(err.clone());
            }
        }

        if step == Step::Confirm {
            if let Some(id) = &script.confirmed_id {
                return Ok(PaymentIntent {
                    id: Some(id.clone()).filter(|id| !id.is_empty()),
                    status: PaymentIntentStatus::Succeeded,
                    ..intent
                });
            }
        }

        Ok(intent)
    }
}

#[async_trait::async_trait]
impl Device for MockDevice {
    fn connected_reader(&self) -> Option<Reader> {
        self.connected.lock().unwrap().clone()
    }

    async fn discover(
        &self,
        _config: DiscoveryConfig,
    ) -> Result<mpsc::UnboundedReceiver<DiscoveryUpdate>, DeviceError> {
        self.record("discover");

        let (tx, rx) = mpsc::unbounded_channel();

        let keep_open = {
            let script = self.script.lock().unwrap();
            for update in script.updates.iter().cloned() {
                tx.send(update).unwrap();
            }
            script.keep_discovery_open
        };

        if keep_open {
            self.discovery_tx.lock().unwrap().push(tx);
        }

        Ok(rx)
    }

    async fn connect(
        &self,
        reader: Reader,
        _config: ReaderConnectConfig,
    ) -> Result<Reader, DeviceError> {
        self.record("connect");

        let connect = self.script.lock().unwrap().connect.clone();

        match connect {
            Connect::Succeed => {
                *self.connected.lock().unwrap() = Some(reader.clone());
                Ok(reader)
            }
            Connect::Fail(err) => Err(err),
            Connect::FailButConnected(err) => {
                *self.connected.lock().unwrap() = Some(reader);
                Err(err)
            }
            Connect::HangThenConnect(delay) => {
                let connected = self.connected.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    *connected.lock().unwrap() = Some(reader);
                });
                std::future::pending().await
            }
            Connect::Hang => std::future::pending().await,
        }
    }

    async fn retrieve_payment_intent(
        &self,
        client_secret: &str,
    ) -> Result<PaymentIntent, DeviceError> {
        let id = client_secret.split("_secret_").next().map(str::to_string);
        let intent = PaymentIntent {
            id,
            amount: None,
            currency: None,
            status: PaymentIntentStatus::RequiresPaymentMethod,
        };
        self.step(Step::Retrieve, "retrieve", intent)
    }

    async fn collect_payment_method(
        &self,
        intent: PaymentIntent,
    ) -> Result<PaymentIntent, DeviceError> {
        self.step(
            Step::Collect,
            "collect",
            PaymentIntent {
                status: PaymentIntentStatus::RequiresConfirmation,
                ..intent
            },
        )
    }

    async fn confirm_payment_intent(
        &self,
        intent: PaymentIntent,
    ) -> Result<PaymentIntent, DeviceError> {
        self.step(
            Step::Confirm,
            "confirm",
            PaymentIntent {
                status: PaymentIntentStatus::Succeeded,
                ..intent
            },
        )
    }
}
