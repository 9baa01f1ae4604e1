//! Core types for decoded telemetry.
//!
//! - [`VariableType`] is one of the six element types a descriptor can carry
//! - [`Value`] is a decoded scalar or fixed-length array
//! - [`VariableSchema`] is the descriptor table with ordered and by-name access
//! - [`Frame`] owns a copy of one tick buffer and decodes fields by name
//! - [`VarData`] converts decoded values into plain Rust types
//!
//! ```rust
//! use pitlane::{Frame, Value, VariableInfo, VariableSchema, VariableType};
//! use std::sync::Arc;
//!
//! let rpm = VariableInfo {
//!     name: "RPM".to_string(),
//!     data_type: VariableType::Float32,
//!     offset: 0,
//!     count: 1,
//!     count_as_time: false,
//!     units: "revs/min".to_string(),
//!     description: "Engine rpm".to_string(),
//! };
//! let schema = Arc::new(VariableSchema::new(vec![rpm], 4).unwrap());
//! let frame = Frame::new(4500.0f32.to_le_bytes().to_vec(), 1, 1, schema);
//!
//! assert_eq!(frame.get("RPM"), Some(Value::Float32(4500.0)));
//! assert_eq!(frame.get_as::<f64>("RPM"), Some(4500.0));
//! assert_eq!(frame.get("Gear"), None);
//! ```

mod bitfield;
mod frame;
mod schema;
mod update_rate;
mod var_data;
mod variable_type;

pub use bitfield::BitField;
pub use frame::Frame;
pub use schema::{VariableInfo, VariableSchema};
pub use update_rate::UpdateRate;
pub use var_data::VarData;
pub use variable_type::{Value, VariableType};
