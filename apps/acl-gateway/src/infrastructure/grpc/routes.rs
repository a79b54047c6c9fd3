//! Served Method Table
//!
//! Full method names (`/<package>.<Service>/<Method>`) of every RPC the
//! gateway mounts, read from the descriptor set emitted by `build.rs`.

use std::collections::HashSet;

use prost::{DecodeError, Message};
use prost_types::FileDescriptorSet;

/// Encoded descriptor set for `gateway.v1`.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/gateway_descriptor.bin"));

/// Set of full method names that resolve to a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServedMethods {
    methods: HashSet<String>,
}

impl ServedMethods {
    /// Methods of the `Admin` and `Biz` services.
    ///
    /// # Errors
    ///
    /// Returns a `DecodeError` if the embedded descriptor set is corrupt.
    pub fn gateway() -> Result<Self, DecodeError> {
        Self::from_descriptor_set(FILE_DESCRIPTOR_SET)
    }

    /// Collect every method of every service in an encoded descriptor set.
    ///
    /// # Errors
    ///
    /// Returns a `DecodeError` if `bytes` is not a `FileDescriptorSet`.
    pub fn from_descriptor_set(bytes: &[u8]) -> Result<Self, DecodeError> {
        let set = FileDescriptorSet::decode(bytes)?;

        let methods = set
            .file
            .iter()
            .flat_map(|file| {
                let package = file.package();
                file.service.iter().flat_map(move |service| {
                    let service_name = if package.is_empty() {
                        service.name().to_string()
                    } else {
                        format!("{package}.{}", service.name())
                    };
                    service
                        .method
                        .iter()
                        .map(move |method| format!("/{service_name}/{}", method.name()))
                })
            })
            .collect();

        Ok(Self { methods })
    }

    /// Whether `full_method` is routed to a handler.
    #[must_use]
    pub fn contains(&self, full_method: &str) -> bool {
        self.methods.contains(full_method)
    }

    /// Number of served methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether no method is served.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ServedMethods {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            methods: iter.into_iter().map(Into::into).collect(),
        }
    }
}
