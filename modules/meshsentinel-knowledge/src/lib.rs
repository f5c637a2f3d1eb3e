pub mod base;
pub mod document;

pub use base::KnowledgeBase;
pub use document::{
    ConnectionEvent, ConnectionEventKind, DeviceProfile, KnowledgeDocument, MeshNodeRecord,
    OptimisationRecord, RetentionSettings, SnmpDeviceRecord, ZigbeeDeviceRecord,
};
