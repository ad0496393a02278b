// Demo mode: an in-process agent with a believable BLE neighbourhood
//
// The demo agent answers exactly like the real one: full state on the
// handshake, partial states addressed by IFace/ID/UUID/Handle for scans, and
// error strings for things that cannot be scanned. It shows:
// - An interface with devices, services, characteristics and readable values
// - An interface that is down (ScanDevices fails)
// - A device that advertises no services (empty but scanned)
// - Scan latency, with device discovery slower than GATT reads
//
// Run with: BLESCOPE_DEMO=1 cargo run --release

use crate::channel::{AgentChannel, ChannelEvent, INBOUND_BUFFER, OUTBOUND_BUFFER};
use crate::protocol::{
    CharacteristicInfo, DeviceInfo, FullState, InterfaceInfo, Operation, PartialState, Request,
    Response, ServiceInfo,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

const DEMO_HOSTNAME: &str = "blescope-demo";

/// Command timeout advertised in the handshake (seconds)
const DEMO_TIMEOUT: u64 = 10;

/// Deterministic stand-in for the remote scanning agent
pub struct DemoAgent {
    interfaces: BTreeMap<String, InterfaceInfo>,
}

impl Default for DemoAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoAgent {
    pub fn new() -> Self {
        Self {
            interfaces: catalog(),
        }
    }

    /// Answer one request the way the real agent would
    pub fn answer(&self, request: &Request) -> Response {
        let args = request.args();
        let reply = match (request.op, args.as_slice()) {
            (Operation::GetFullState, _) => Ok(to_value(&FullState {
                timeout: Some(DEMO_TIMEOUT),
                hostname: Some(DEMO_HOSTNAME.to_string()),
                interfaces: Some(self.interface_summaries()),
            })),
            (Operation::ScanInterfaces, _) => Ok(to_value(&PartialState {
                interfaces: Some(self.interface_summaries()),
                ..Default::default()
            })),
            (Operation::ScanDevices, [iface, ..]) => self.scan_devices(iface),
            (Operation::ScanServices, [iface, dev, ..]) => self.scan_services(iface, dev),
            (Operation::ScanCharacteristics, [iface, dev, svc, ..]) => {
                self.scan_characteristics(iface, dev, svc)
            }
            (Operation::ReadValue, [iface, dev, svc, handle, ..]) => {
                self.read_value(iface, dev, svc, handle)
            }
            (op, _) => Err(format!("{} needs more arguments", op.as_str())),
        };

        match reply {
            Ok(state) => Response::ok(request.op, state),
            Err(message) => Response::failed(request.op, message).echoing(request),
        }
    }

    /// Simulated round-trip time for an operation
    pub fn latency(op: Operation) -> Duration {
        match op {
            Operation::GetFullState => Duration::from_millis(100),
            Operation::ScanInterfaces => Duration::from_millis(300),
            Operation::ScanDevices => Duration::from_millis(1500),
            Operation::ScanServices | Operation::ScanCharacteristics => {
                Duration::from_millis(600)
            }
            Operation::ReadValue => Duration::from_millis(250),
        }
    }

    fn interface_summaries(&self) -> BTreeMap<String, InterfaceInfo> {
        self.interfaces
            .iter()
            .map(|(id, info)| {
                let summary = InterfaceInfo {
                    devices: None,
                    ..info.clone()
                };
                (id.clone(), summary)
            })
            .collect()
    }

    fn interface(&self, iface: &str) -> Result<&InterfaceInfo, String> {
        self.interfaces
            .get(iface)
            .ok_or_else(|| format!("No such interface: {iface}"))
    }

    fn device(&self, iface: &str, dev: &str) -> Result<&DeviceInfo, String> {
        self.interface(iface)?
            .devices
            .as_ref()
            .and_then(|devices| devices.get(dev))
            .ok_or_else(|| format!("Device {dev} not found on {iface}"))
    }

    fn service(&self, iface: &str, dev: &str, svc: &str) -> Result<&ServiceInfo, String> {
        self.device(iface, dev)?
            .services
            .as_ref()
            .and_then(|services| services.get(svc))
            .ok_or_else(|| format!("Service {svc} not found on {dev}"))
    }

    fn scan_devices(&self, iface: &str) -> Result<Value, String> {
        let info = self.interface(iface)?;
        let devices = info
            .devices
            .as_ref()
            .ok_or_else(|| format!("Interface {iface} is down"))?;
        let devices = devices
            .iter()
            .map(|(id, dev)| {
                let summary = DeviceInfo {
                    services: None,
                    ..dev.clone()
                };
                (id.clone(), summary)
            })
            .collect();

        Ok(to_value(&PartialState {
            iface: Some(iface.to_string()),
            devices: Some(devices),
            ..Default::default()
        }))
    }

    fn scan_services(&self, iface: &str, dev: &str) -> Result<Value, String> {
        let services = self
            .device(iface, dev)?
            .services
            .iter()
            .flatten()
            .map(|(uuid, svc)| {
                let summary = ServiceInfo {
                    characteristics: None,
                    ..svc.clone()
                };
                (uuid.clone(), summary)
            })
            .collect();

        Ok(to_value(&PartialState {
            iface: Some(iface.to_string()),
            device: Some(dev.to_string()),
            services: Some(services),
            ..Default::default()
        }))
    }

    fn scan_characteristics(&self, iface: &str, dev: &str, svc: &str) -> Result<Value, String> {
        let chars = self
            .service(iface, dev, svc)?
            .characteristics
            .iter()
            .flatten()
            .map(|(handle, chr)| {
                let summary = CharacteristicInfo {
                    value: None,
                    ..chr.clone()
                };
                (handle.clone(), summary)
            })
            .collect();

        Ok(to_value(&PartialState {
            iface: Some(iface.to_string()),
            device: Some(dev.to_string()),
            service: Some(svc.to_string()),
            characteristics: Some(chars),
            ..Default::default()
        }))
    }

    fn read_value(&self, iface: &str, dev: &str, svc: &str, handle: &str) -> Result<Value, String> {
        let chr = self
            .service(iface, dev, svc)?
            .characteristics
            .as_ref()
            .and_then(|chars| chars.get(handle))
            .ok_or_else(|| format!("Characteristic {handle} not found in {svc}"))?;
        let value = chr
            .value
            .clone()
            .ok_or_else(|| format!("Characteristic {handle} is not readable"))?;

        Ok(to_value(&PartialState {
            iface: Some(iface.to_string()),
            device: Some(dev.to_string()),
            service: Some(svc.to_string()),
            handle: Some(handle.to_string()),
            value: Some(value),
            ..Default::default()
        }))
    }
}

fn to_value<T: serde::Serialize>(state: &T) -> Value {
    serde_json::to_value(state).unwrap_or(Value::Null)
}

/// Run the demo agent behind the same channel types as a real connection
pub fn spawn() -> (AgentChannel, mpsc::Receiver<ChannelEvent>) {
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let (event_tx, event_rx) = mpsc::channel(INBOUND_BUFFER);

    tokio::spawn(async move {
        let agent = std::sync::Arc::new(DemoAgent::new());
        tracing::info!("Demo agent started");

        while let Some(json) = out_rx.recv().await {
            let request: Request = match serde_json::from_str(&json) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!("Demo agent ignoring bad request: {}", e);
                    continue;
                }
            };

            // Each request is answered independently, so replies may interleave
            let agent = agent.clone();
            let event_tx = event_tx.clone();
            tokio::spawn(async move {
                sleep(DemoAgent::latency(request.op)).await;
                let reply = agent.answer(&request);
                match serde_json::to_string(&reply) {
                    Ok(text) => {
                        let _ = event_tx.send(ChannelEvent::Message(text)).await;
                    }
                    Err(e) => tracing::error!("Demo agent could not encode reply: {}", e),
                }
            });
        }

        let _ = event_tx
            .send(ChannelEvent::Closed("demo agent stopped".to_string()))
            .await;
    });

    (AgentChannel::new(out_tx), event_rx)
}

// ─────────────────────────────────────────────────────────────────────────────
// Demo data
// ─────────────────────────────────────────────────────────────────────────────

fn characteristic(
    handle: &str,
    vhandle: &str,
    props: &str,
    uuid: &str,
    value: Option<&str>,
) -> (String, CharacteristicInfo) {
    (
        handle.to_string(),
        CharacteristicInfo {
            handle: Some(handle.to_string()),
            value_handle: Some(vhandle.to_string()),
            properties: Some(json!(props)),
            uuid: Some(uuid.to_string()),
            short: Some(uuid[..8].to_string()),
            value: value.map(|v| json!(v)),
        },
    )
}

fn service(
    uuid: &str,
    start: &str,
    end: &str,
    chars: Vec<(String, CharacteristicInfo)>,
) -> (String, ServiceInfo) {
    (
        uuid.to_string(),
        ServiceInfo {
            uuid: Some(uuid.to_string()),
            short: Some(uuid[..8].to_string()),
            handle_start: Some(json!(start)),
            handle_end: Some(json!(end)),
            characteristics: Some(chars.into_iter().collect()),
        },
    )
}

fn device(id: &str, name: &str, services: Vec<(String, ServiceInfo)>) -> (String, DeviceInfo) {
    (
        id.to_string(),
        DeviceInfo {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            names: if name.is_empty() {
                Vec::new()
            } else {
                vec![name.to_string()]
            },
            services: Some(services.into_iter().collect()),
        },
    )
}

fn catalog() -> BTreeMap<String, InterfaceInfo> {
    const GENERIC_ACCESS: &str = "00001800-0000-1000-8000-00805f9b34fb";
    const HEART_RATE: &str = "0000180d-0000-1000-8000-00805f9b34fb";
    const BATTERY: &str = "0000180f-0000-1000-8000-00805f9b34fb";
    const DEVICE_NAME: &str = "00002a00-0000-1000-8000-00805f9b34fb";
    const HR_MEASUREMENT: &str = "00002a37-0000-1000-8000-00805f9b34fb";
    const BODY_LOCATION: &str = "00002a38-0000-1000-8000-00805f9b34fb";
    const BATTERY_LEVEL: &str = "00002a19-0000-1000-8000-00805f9b34fb";
    const FLOWER_DATA: &str = "00001204-0000-1000-8000-00805f9b34fb";
    const FLOWER_REALTIME: &str = "00001a01-0000-1000-8000-00805f9b34fb";

    let heart_monitor = device(
        "84:2E:14:87:66:97",
        "Jovan Heart Monitor",
        vec![
            service(
                GENERIC_ACCESS,
                "0001",
                "0007",
                vec![characteristic("0002", "0003", "READ", DEVICE_NAME, Some("Jovan HRM"))],
            ),
            service(
                HEART_RATE,
                "000c",
                "0011",
                vec![
                    characteristic("000d", "000e", "NOTIFY", HR_MEASUREMENT, None),
                    characteristic("0010", "0011", "READ", BODY_LOCATION, Some("0x01")),
                ],
            ),
            service(
                BATTERY,
                "0012",
                "0015",
                vec![characteristic("0013", "0014", "READ NOTIFY", BATTERY_LEVEL, Some("0x5a"))],
            ),
        ],
    );

    let flower_care = device(
        "C4:7C:8D:6A:3E:21",
        "Flower care",
        vec![
            service(
                GENERIC_ACCESS,
                "0001",
                "0007",
                vec![characteristic("0002", "0003", "READ", DEVICE_NAME, Some("Flower care"))],
            ),
            service(
                FLOWER_DATA,
                "0031",
                "003a",
                vec![characteristic(
                    "0034",
                    "0035",
                    "READ WRITE NOTIFY",
                    FLOWER_REALTIME,
                    Some("0xaabbccdd"),
                )],
            ),
        ],
    );

    let beacon = device("F0:99:19:5B:00:0C", "", vec![]);

    let mut interfaces = BTreeMap::new();
    interfaces.insert(
        "hci0".to_string(),
        InterfaceInfo {
            iface: Some("hci0".to_string()),
            address: Some("B8:27:EB:4C:21:7F".to_string()),
            running: Some(json!(1)),
            devices: Some([heart_monitor, flower_care, beacon].into_iter().collect()),
        },
    );
    // Down: no device map, so ScanDevices fails
    interfaces.insert(
        "hci1".to_string(),
        InterfaceInfo {
            iface: Some("hci1".to_string()),
            address: Some("00:1A:7D:DA:71:13".to_string()),
            running: Some(json!(0)),
            devices: None,
        },
    );
    interfaces
}
