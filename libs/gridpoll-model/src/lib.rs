//! gridpoll device model
//!
//! - [`Scale`]: exact rational multiplier from raw integers to engineering units
//! - [`ParameterDescriptor`] / [`RegisterMap`]: immutable, ordered register tables
//! - [`DeviceProfile`]: one polled device, from unidentified to finalized
//! - [`vendor`]: built-in register tables, expressed as data

pub mod descriptor;
pub mod error;
pub mod profile;
pub mod register_map;
pub mod scale;
pub mod vendor;

pub use descriptor::{ParameterDescriptor, RegisterKind};
pub use error::{IdentityError, MapError, ProfileError, ScaleError, UnknownModelError, WriteError};
pub use profile::{DeviceProfile, ModelInfo, ProfileState};
pub use register_map::{Overlap, RegisterMap, RegisterMapBuilder};
pub use scale::Scale;
pub use vendor::{ChannelTemplate, ModelEntry, ModelSource, VendorSpec};

// The codec types appear throughout the model API
pub use gridpoll_codec::{CodecConfig, DataKind, Value, WordOrder};
