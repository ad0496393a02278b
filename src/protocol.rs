// Protocol module - the JSON message contract spoken with the scanning agent
//
// Requests name an operation and carry the path identifiers of the node being
// scanned in Arg1..Arg5. Responses echo the operation, carry an error string
// ("No error." on success) and a state payload: the full BLE tree for the
// handshake, or a partial state addressed by its own IFace/ID/UUID/Handle
// fields for scans.
//
// The agent spells keys in PascalCase; lower-case spellings are accepted too.

use crate::error::{SyncError, SyncResult};
use crate::tree::{ChildRecord, NodePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Error string the agent sends on success
pub const NO_ERROR: &str = "No error.";

/// Identifier used for the single value leaf under a characteristic
pub const VALUE_LEAF_ID: &str = "value";

/// Remote operations understood by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(alias = "GetBLEInfo")]
    GetFullState,
    ScanInterfaces,
    ScanDevices,
    ScanServices,
    ScanCharacteristics,
    ReadValue,
}

impl Operation {
    /// Number of path identifiers the operation addresses
    pub fn path_depth(self) -> usize {
        match self {
            Self::GetFullState | Self::ScanInterfaces => 0,
            Self::ScanDevices => 1,
            Self::ScanServices => 2,
            Self::ScanCharacteristics => 3,
            Self::ReadValue => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetFullState => "GetFullState",
            Self::ScanInterfaces => "ScanInterfaces",
            Self::ScanDevices => "ScanDevices",
            Self::ScanServices => "ScanServices",
            Self::ScanCharacteristics => "ScanCharacteristics",
            Self::ReadValue => "ReadValue",
        }
    }
}

/// Outbound command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "Type", alias = "type")]
    pub op: Operation,
    #[serde(rename = "Arg1", alias = "arg1", default, skip_serializing_if = "Option::is_none")]
    pub arg1: Option<String>,
    #[serde(rename = "Arg2", alias = "arg2", default, skip_serializing_if = "Option::is_none")]
    pub arg2: Option<String>,
    #[serde(rename = "Arg3", alias = "arg3", default, skip_serializing_if = "Option::is_none")]
    pub arg3: Option<String>,
    #[serde(rename = "Arg4", alias = "arg4", default, skip_serializing_if = "Option::is_none")]
    pub arg4: Option<String>,
    #[serde(rename = "Arg5", alias = "arg5", default, skip_serializing_if = "Option::is_none")]
    pub arg5: Option<String>,
}

impl Request {
    /// Build a request whose ArgN fields are the successive path identifiers
    pub fn new(op: Operation, path: &NodePath) -> Self {
        let mut args = path.segments().iter().cloned();
        Self {
            op,
            arg1: args.next(),
            arg2: args.next(),
            arg3: args.next(),
            arg4: args.next(),
            arg5: args.next(),
        }
    }

    pub fn handshake() -> Self {
        Self::new(Operation::GetFullState, &NodePath::root())
    }

    /// Populated arguments, in order
    pub fn args(&self) -> Vec<&str> {
        [&self.arg1, &self.arg2, &self.arg3, &self.arg4, &self.arg5]
            .into_iter()
            .map_while(|arg| arg.as_deref())
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Inbound reply from the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "Type", alias = "type")]
    pub op: Operation,
    #[serde(rename = "Error", alias = "error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "State", alias = "state", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    // Some agents echo the request arguments; used when the state carries no addressing
    #[serde(rename = "Arg1", alias = "arg1", default, skip_serializing_if = "Option::is_none")]
    pub arg1: Option<String>,
    #[serde(rename = "Arg2", alias = "arg2", default, skip_serializing_if = "Option::is_none")]
    pub arg2: Option<String>,
    #[serde(rename = "Arg3", alias = "arg3", default, skip_serializing_if = "Option::is_none")]
    pub arg3: Option<String>,
    #[serde(rename = "Arg4", alias = "arg4", default, skip_serializing_if = "Option::is_none")]
    pub arg4: Option<String>,
    #[serde(rename = "Arg5", alias = "arg5", default, skip_serializing_if = "Option::is_none")]
    pub arg5: Option<String>,
}

impl Response {
    pub fn ok(op: Operation, state: Value) -> Self {
        Self {
            op,
            error: Some(NO_ERROR.to_string()),
            state: Some(state),
            arg1: None,
            arg2: None,
            arg3: None,
            arg4: None,
            arg5: None,
        }
    }

    pub fn failed(op: Operation, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            state: None,
            ..Self::ok(op, Value::Null)
        }
    }

    /// Copy the request's arguments into the reply
    pub fn echoing(mut self, request: &Request) -> Self {
        self.arg1 = request.arg1.clone();
        self.arg2 = request.arg2.clone();
        self.arg3 = request.arg3.clone();
        self.arg4 = request.arg4.clone();
        self.arg5 = request.arg5.clone();
        self
    }

    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// The agent's error message, None on success
    pub fn remote_error(&self) -> Option<&str> {
        match self.error.as_deref() {
            None | Some(NO_ERROR) => None,
            Some(message) => Some(message),
        }
    }

    pub fn full_state(&self) -> SyncResult<FullState> {
        let state = self
            .state
            .clone()
            .ok_or_else(|| SyncError::MalformedSnapshot("response carries no state".into()))?;
        serde_json::from_value(state).map_err(|e| SyncError::MalformedSnapshot(e.to_string()))
    }

    pub fn partial_state(&self) -> SyncResult<PartialState> {
        match &self.state {
            None | Some(Value::Null) => Ok(PartialState::default()),
            Some(state) => serde_json::from_value(state.clone())
                .map_err(|e| SyncError::MalformedSnapshot(e.to_string())),
        }
    }

    fn echoed_args(&self) -> Vec<String> {
        [&self.arg1, &self.arg2, &self.arg3, &self.arg4, &self.arg5]
            .into_iter()
            .map_while(|arg| arg.clone())
            .collect()
    }

    /// Rebuild the path this response answers from its own addressing
    ///
    /// Positional addressing in the state (IFace, ID, UUID, Handle) wins;
    /// echoed ArgN fields are the fallback. None when neither reaches the
    /// depth the operation needs.
    pub fn addressed_path(&self) -> Option<NodePath> {
        let depth = self.op.path_depth();
        if depth == 0 {
            return Some(NodePath::root());
        }

        let from_state = self
            .partial_state()
            .map(|state| state.addressing())
            .unwrap_or_default();
        [from_state, self.echoed_args()]
            .into_iter()
            .find(|segments| segments.len() >= depth)
            .map(|mut segments| {
                segments.truncate(depth);
                NodePath::new(segments)
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Handshake payload: everything the agent currently knows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullState {
    /// Agent's command timeout in seconds
    #[serde(rename = "Timeout", alias = "timeout", default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(rename = "Hostname", alias = "hostname", default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(rename = "IFaces", alias = "interfaces", default, skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<BTreeMap<String, InterfaceInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    #[serde(rename = "IFace", alias = "iface", default, skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
    #[serde(rename = "Address", alias = "address", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "Running", alias = "running", default, skip_serializing_if = "Option::is_none")]
    pub running: Option<Value>,
    #[serde(rename = "Devs", alias = "devices", default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<BTreeMap<String, DeviceInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "ID", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Name", alias = "name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Names", alias = "names", default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    #[serde(rename = "Services", alias = "services", default, skip_serializing_if = "Option::is_none")]
    pub services: Option<BTreeMap<String, ServiceInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(rename = "UUID", alias = "uuid", default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// First 8 hex digits of the UUID
    #[serde(rename = "Service", alias = "service", default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(rename = "HDStart", alias = "hd_start", default, skip_serializing_if = "Option::is_none")]
    pub handle_start: Option<Value>,
    #[serde(rename = "HDEnd", alias = "hd_end", default, skip_serializing_if = "Option::is_none")]
    pub handle_end: Option<Value>,
    #[serde(rename = "Chars", alias = "characteristics", default, skip_serializing_if = "Option::is_none")]
    pub characteristics: Option<BTreeMap<String, CharacteristicInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicInfo {
    #[serde(rename = "Handle", alias = "handle", default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(rename = "VHandle", alias = "vhandle", default, skip_serializing_if = "Option::is_none")]
    pub value_handle: Option<String>,
    #[serde(rename = "Properties", alias = "properties", default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(rename = "UUID", alias = "uuid", default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(rename = "Service", alias = "service", default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    /// Last value read, once a ReadValue has completed
    #[serde(rename = "Value", alias = "value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Scan reply payload: addressing fields plus the one child map it answers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialState {
    #[serde(rename = "IFace", alias = "iface", default, skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
    #[serde(rename = "ID", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Service UUID when addressing a service or characteristic
    #[serde(rename = "UUID", alias = "uuid", default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(rename = "Handle", alias = "handle", default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,

    #[serde(rename = "IFaces", alias = "interfaces", default, skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<BTreeMap<String, InterfaceInfo>>,
    #[serde(rename = "Devs", alias = "devices", default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<BTreeMap<String, DeviceInfo>>,
    #[serde(rename = "Services", alias = "services", default, skip_serializing_if = "Option::is_none")]
    pub services: Option<BTreeMap<String, ServiceInfo>>,
    #[serde(rename = "Chars", alias = "characteristics", default, skip_serializing_if = "Option::is_none")]
    pub characteristics: Option<BTreeMap<String, CharacteristicInfo>>,
    #[serde(rename = "Value", alias = "value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PartialState {
    /// Leading run of addressing identifiers, in path order
    pub fn addressing(&self) -> Vec<String> {
        [&self.iface, &self.device, &self.service, &self.handle]
            .into_iter()
            .map_while(|field| field.clone())
            .collect()
    }

    /// Child records for the node this state answers
    pub fn child_records(&self, op: Operation) -> SyncResult<Vec<ChildRecord>> {
        let missing = |key: &str| {
            SyncError::MalformedSnapshot(format!("{} reply has no '{key}' map", op.as_str()))
        };
        match op {
            Operation::GetFullState | Operation::ScanInterfaces => {
                map_records(self.interfaces.as_ref().ok_or_else(|| missing("IFaces"))?)
            }
            Operation::ScanDevices => {
                map_records(self.devices.as_ref().ok_or_else(|| missing("Devs"))?)
            }
            Operation::ScanServices => {
                map_records(self.services.as_ref().ok_or_else(|| missing("Services"))?)
            }
            Operation::ScanCharacteristics => {
                map_records(self.characteristics.as_ref().ok_or_else(|| missing("Chars"))?)
            }
            Operation::ReadValue => {
                let value = self.value.as_ref().ok_or_else(|| missing("Value"))?;
                Ok(vec![value_record(value)])
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion into tree records
// ─────────────────────────────────────────────────────────────────────────────

/// A state record that knows its identity and how to describe itself
trait Discovered {
    fn identity(&self) -> Option<&str>;
    fn to_record(&self, id: &str) -> SyncResult<ChildRecord>;
}

fn map_records<T: Discovered>(map: &BTreeMap<String, T>) -> SyncResult<Vec<ChildRecord>> {
    map.iter()
        .map(|(key, info)| {
            match info.identity() {
                Some(id) if id == key.as_str() => {}
                Some(id) => {
                    return Err(SyncError::MalformedSnapshot(format!(
                        "entry '{key}' identifies itself as '{id}'"
                    )))
                }
                None => {
                    return Err(SyncError::MalformedSnapshot(format!(
                        "entry '{key}' is missing its identity field"
                    )))
                }
            }
            info.to_record(key)
        })
        .collect()
}

fn optional_records<T: Discovered>(
    map: Option<&BTreeMap<String, T>>,
) -> SyncResult<Option<Vec<ChildRecord>>> {
    map.map(map_records).transpose()
}

/// Render a loosely typed JSON scalar for display
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn value_record(value: &Value) -> ChildRecord {
    ChildRecord::new(VALUE_LEAF_ID, scalar(value)).with_attribute("Value", scalar(value))
}

fn set_attr(record: &mut ChildRecord, key: &str, value: Option<String>) {
    if let Some(value) = value {
        record.attributes.insert(key.to_string(), value);
    }
}

impl Discovered for InterfaceInfo {
    fn identity(&self) -> Option<&str> {
        self.iface.as_deref()
    }

    fn to_record(&self, id: &str) -> SyncResult<ChildRecord> {
        let mut record = ChildRecord::new(id, id);
        set_attr(&mut record, "Address", self.address.clone());
        set_attr(&mut record, "Running", self.running.as_ref().map(scalar));
        record.children = optional_records(self.devices.as_ref())?;
        Ok(record)
    }
}

impl Discovered for DeviceInfo {
    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn to_record(&self, id: &str) -> SyncResult<ChildRecord> {
        let label = self
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(id);
        let mut record = ChildRecord::new(id, label);
        set_attr(&mut record, "Name", self.name.clone());
        if !self.names.is_empty() {
            record
                .attributes
                .insert("Names".to_string(), self.names.join(", "));
        }
        record.children = optional_records(self.services.as_ref())?;
        Ok(record)
    }
}

impl Discovered for ServiceInfo {
    fn identity(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    fn to_record(&self, id: &str) -> SyncResult<ChildRecord> {
        let label = self.short.as_deref().unwrap_or(id);
        let mut record = ChildRecord::new(id, label);
        set_attr(&mut record, "UUID", self.uuid.clone());
        set_attr(&mut record, "HDStart", self.handle_start.as_ref().map(scalar));
        set_attr(&mut record, "HDEnd", self.handle_end.as_ref().map(scalar));
        record.children = optional_records(self.characteristics.as_ref())?;
        Ok(record)
    }
}

impl Discovered for CharacteristicInfo {
    fn identity(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    fn to_record(&self, id: &str) -> SyncResult<ChildRecord> {
        let mut record = ChildRecord::new(id, id);
        set_attr(&mut record, "VHandle", self.value_handle.clone());
        set_attr(&mut record, "Properties", self.properties.as_ref().map(scalar));
        set_attr(&mut record, "UUID", self.uuid.clone());
        set_attr(&mut record, "Service", self.short.clone());
        record.children = self.value.as_ref().map(|value| vec![value_record(value)]);
        Ok(record)
    }
}

impl FullState {
    /// Root record for the handshake: hostname label plus every interface
    pub fn root_record(&self) -> SyncResult<ChildRecord> {
        let interfaces = self.interfaces.as_ref().ok_or_else(|| {
            SyncError::MalformedSnapshot("full state carries no 'IFaces' map".into())
        })?;

        let mut record = ChildRecord::new("", self.hostname.as_deref().unwrap_or("BLE agent"));
        set_attr(&mut record, "Hostname", self.hostname.clone());
        set_attr(&mut record, "Timeout", self.timeout.map(|t| t.to_string()));
        record.children = Some(map_records(interfaces)?);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_args_follow_path() {
        let request = Request::new(
            Operation::ScanServices,
            &NodePath::from(["hci0", "84:2E:14:87:66:97"]),
        );
        let json: Value = serde_json::from_str(&request.to_json().unwrap()).unwrap();

        assert_eq!(
            json,
            json!({"Type": "ScanServices", "Arg1": "hci0", "Arg2": "84:2E:14:87:66:97"})
        );
        assert_eq!(request.args(), vec!["hci0", "84:2E:14:87:66:97"]);
    }

    #[test]
    fn test_handshake_request_has_no_args() {
        let json = Request::handshake().to_json().unwrap();
        assert_eq!(json, r#"{"Type":"GetFullState"}"#);
    }

    #[test]
    fn test_response_accepts_legacy_and_lowercase_keys() {
        let legacy = Response::parse(r#"{"Type":"GetBLEInfo","Error":"No error.","State":{}}"#)
            .unwrap();
        assert_eq!(legacy.op, Operation::GetFullState);
        assert!(legacy.remote_error().is_none());

        let lower = Response::parse(r#"{"type":"ScanDevices","error":"Device busy"}"#).unwrap();
        assert_eq!(lower.op, Operation::ScanDevices);
        assert_eq!(lower.remote_error(), Some("Device busy"));
    }

    #[test]
    fn test_addressed_path_from_state() {
        let response = Response::ok(
            Operation::ScanServices,
            json!({"IFace": "hci0", "ID": "AA:BB", "Services": {}}),
        );
        assert_eq!(
            response.addressed_path(),
            Some(NodePath::from(["hci0", "AA:BB"]))
        );
    }

    #[test]
    fn test_addressed_path_falls_back_to_echoed_args() {
        let request = Request::new(Operation::ScanDevices, &NodePath::from(["hci1"]));
        let response = Response::failed(Operation::ScanDevices, "Interface down").echoing(&request);
        assert_eq!(response.addressed_path(), Some(NodePath::from(["hci1"])));

        let bare = Response::failed(Operation::ScanDevices, "Interface down");
        assert_eq!(bare.addressed_path(), None);
    }

    #[test]
    fn test_full_state_root_record() {
        let response = Response::ok(
            Operation::GetFullState,
            json!({
                "Timeout": 15,
                "Hostname": "blepi",
                "IFaces": {
                    "hci0": {"IFace": "hci0", "Address": "B8:27:EB:12:34:56", "Running": 1}
                }
            }),
        );
        let state = response.full_state().unwrap();
        assert_eq!(state.timeout, Some(15));

        let root = state.root_record().unwrap();
        assert_eq!(root.label, "blepi");
        let interfaces = root.children.unwrap();
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].id, "hci0");
        assert_eq!(interfaces[0].attributes["Running"], "1");
        assert!(interfaces[0].children.is_none());
    }

    #[test]
    fn test_missing_identity_is_malformed() {
        let state: FullState =
            serde_json::from_value(json!({"IFaces": {"hci0": {"Address": "x"}}})).unwrap();
        assert!(matches!(
            state.root_record(),
            Err(SyncError::MalformedSnapshot(_))
        ));

        let mismatched: FullState =
            serde_json::from_value(json!({"IFaces": {"hci0": {"IFace": "hci1"}}})).unwrap();
        assert!(matches!(
            mismatched.root_record(),
            Err(SyncError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_empty_device_map_means_scanned() {
        let state = PartialState {
            iface: Some("hci0".into()),
            devices: Some(BTreeMap::new()),
            ..Default::default()
        };
        assert_eq!(state.child_records(Operation::ScanDevices).unwrap(), vec![]);

        let unanswered = PartialState::default();
        assert!(unanswered.child_records(Operation::ScanDevices).is_err());
    }

    #[test]
    fn test_device_label_prefers_name() {
        let devices: BTreeMap<String, DeviceInfo> = serde_json::from_value(json!({
            "84:2E:14:87:66:97": {"ID": "84:2E:14:87:66:97", "Name": "Jovan Heart Monitor"},
            "C0:FF:EE:00:00:01": {"ID": "C0:FF:EE:00:00:01", "Name": ""}
        }))
        .unwrap();
        let records = map_records(&devices).unwrap();
        assert_eq!(records[0].label, "Jovan Heart Monitor");
        assert_eq!(records[1].label, "C0:FF:EE:00:00:01");
    }

    #[test]
    fn test_read_value_becomes_leaf() {
        let state = PartialState {
            value: Some(json!("0x5A")),
            ..Default::default()
        };
        let records = state.child_records(Operation::ReadValue).unwrap();
        assert_eq!(records, vec![value_record(&json!("0x5A"))]);
        assert_eq!(records[0].id, VALUE_LEAF_ID);
        assert_eq!(records[0].label, "0x5A");
    }
}
