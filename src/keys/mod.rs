//! Keys Module
//!
//! Deterministic cache-key derivation: parameter canonicalization, call
//! descriptors and the key deriver.

mod descriptor;
mod param;


pub use descriptor::{CallDescriptor, CallParameter, KeyDeriver, KeyMaterial, Parameter};
pub use param::{DefaultParameterKeyProvider, ParamValue, ParameterKeyProvider};
