// SPDX-License-Identifier: Apache-2.0

//! Core building blocks of the Firebird federation engine
//!
//! Values, the two type systems and the pure bridge between them, plus the
//! typed option model and the descriptors built from it.

pub mod bridge;
pub mod charset;
pub mod descriptor;
pub mod error;
pub mod options;
pub mod sensitive;
pub mod types;
pub mod value;

pub use bridge::{from_remote, to_remote, BridgeContext};
pub use charset::CharsetPolicy;
pub use descriptor::{
    BoolSentinel, ColumnDescriptor, ConversionMode, EffectiveOptions, ForeignTable, RemoteSource,
    ServerDescriptor, ServerId, UserMapping,
};
pub use error::{FdwError, FdwResult};
pub use options::{ColumnOptions, FdwOption, OptionScope, ServerOptions, TableOptions, UserMappingOptions};
pub use sensitive::Sensitive;
pub use types::{FieldMetadata, LocalType, RemoteType, RemoteVersion};
pub use value::{RemoteValue, Row, RowId, Value};
