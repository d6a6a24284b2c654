//! Call Descriptors and Key Derivation
//!
//! A call descriptor names the operation being cached (declaring type, member)
//! and carries its argument values. The key deriver turns it into the key
//! material a strategy is built from.

use std::any::type_name;
use std::sync::Arc;

use crate::error::{CacheError, Result};
use crate::keys::{DefaultParameterKeyProvider, ParamValue, ParameterKeyProvider};

// == Call Parameter ==
/// An argument value and whether it takes part in the key.
#[derive(Debug, Clone, PartialEq)]
pub struct CallParameter {
    pub value: ParamValue,
    pub exclude_from_key: bool,
}

impl CallParameter {
    /// An argument that qualifies the cache key.
    pub fn keyed(value: impl Into<ParamValue>) -> Self {
        Self {
            value: value.into(),
            exclude_from_key: false,
        }
    }

    /// An argument passed to retrieval only; it never affects the key.
    pub fn excluded(value: impl Into<ParamValue>) -> Self {
        Self {
            value: value.into(),
            exclude_from_key: true,
        }
    }
}

/// Markers for how arguments are treated when deriving keys.
pub struct Parameter;

impl Parameter {
    /// Flags `value` as "do not cache": two calls differing only in this
    /// argument share the same cache slot.
    pub fn exclude_from_key(value: impl Into<ParamValue>) -> CallParameter {
        CallParameter::excluded(value)
    }
}

// == Call Descriptor ==
/// Structured capture of a member/method reference plus its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    pub declaring_type: String,
    pub member: String,
    pub parameters: Vec<CallParameter>,
}

impl CallDescriptor {
    pub fn new(declaring_type: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            member: member.into(),
            parameters: Vec::new(),
        }
    }

    /// Describes `member` of the Rust type `T`, using the type's short name
    /// (no module path, no generic arguments) as the declaring type.
    pub fn for_type<T: ?Sized>(member: impl Into<String>) -> Self {
        Self::new(short_type_name::<T>(), member)
    }

    /// Appends an argument that takes part in the key.
    pub fn arg(mut self, value: impl Into<ParamValue>) -> Self {
        self.parameters.push(CallParameter::keyed(value));
        self
    }

    /// Appends an argument excluded from the key.
    pub fn arg_excluded(mut self, value: impl Into<ParamValue>) -> Self {
        self.parameters.push(CallParameter::excluded(value));
        self
    }

    /// Appends a prepared parameter.
    pub fn param(mut self, parameter: CallParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Checks that the descriptor names a single, directly resolvable member.
    ///
    /// Nested member chains (`a.b`) and expressions (`f(x)`, `a + b`) cannot
    /// be keyed reliably and are rejected.
    pub fn validate(&self) -> Result<()> {
        if self.declaring_type.trim().is_empty() {
            return Err(CacheError::UnsupportedOperationDescriptor(
                "declaring type name is empty".to_string(),
            ));
        }
        if self.member.trim().is_empty() {
            return Err(CacheError::UnsupportedOperationDescriptor(format!(
                "member name is empty on {}",
                self.declaring_type
            )));
        }
        if self.member.contains('.') {
            return Err(CacheError::UnsupportedOperationDescriptor(format!(
                "nested member chain '{}' on {} cannot be cached",
                self.member, self.declaring_type
            )));
        }
        if !self
            .member
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_')
        {
            return Err(CacheError::UnsupportedOperationDescriptor(format!(
                "'{}' on {} is an expression, not a member",
                self.member, self.declaring_type
            )));
        }
        Ok(())
    }

    /// Returns the argument values that take part in the key, in order.
    pub fn key_parameters(&self) -> Vec<ParamValue> {
        self.parameters
            .iter()
            .filter(|p| !p.exclude_from_key)
            .map(|p| p.value.clone())
            .collect()
    }
}

fn short_type_name<T: ?Sized>() -> String {
    let full = type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_string()
}

// == Key Material ==
/// The logical identity of a cached operation before it becomes a string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyMaterial {
    pub region: String,
    pub base_key: String,
    pub parameters: Vec<ParamValue>,
}

impl KeyMaterial {
    pub fn new(base_key: impl Into<String>) -> Self {
        Self {
            region: String::new(),
            base_key: base_key.into(),
            parameters: Vec::new(),
        }
    }
}

// == Key Deriver ==
/// Turns call descriptors and key material into canonical key strings.
#[derive(Clone)]
pub struct KeyDeriver {
    provider: Arc<dyn ParameterKeyProvider>,
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new(Arc::new(DefaultParameterKeyProvider))
    }
}

impl KeyDeriver {
    pub fn new(provider: Arc<dyn ParameterKeyProvider>) -> Self {
        Self { provider }
    }

    /// Validates `descriptor` and extracts `(region, base_key, parameters)`.
    pub fn derive(&self, descriptor: &CallDescriptor) -> Result<KeyMaterial> {
        descriptor.validate()?;
        Ok(KeyMaterial {
            region: descriptor.declaring_type.clone(),
            base_key: descriptor.member.clone(),
            parameters: descriptor.key_parameters(),
        })
    }

    /// Returns the key fragment for a single parameter.
    pub fn parameter_key(&self, parameter: &ParamValue) -> String {
        self.provider.parameter_key(parameter)
    }

    /// Builds `region.base_key[.p1.p2...]`.
    ///
    /// The region prefix is left out when the region is empty.
    pub fn key(&self, material: &KeyMaterial) -> String {
        let mut key = if material.region.is_empty() {
            material.base_key.clone()
        } else {
            format!("{}.{}", material.region, material.base_key)
        };

        for parameter in &material.parameters {
            key.push('.');
            key.push_str(&self.parameter_key(parameter));
        }
        key
    }

    /// Validates and keys a descriptor in one step.
    pub fn key_for(&self, descriptor: &CallDescriptor) -> Result<String> {
        let material = self.derive(descriptor)?;
        Ok(self.key(&material))
    }
}
