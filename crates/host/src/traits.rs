use onebridge_core::{Handle, RemoteValue};

use crate::error::HostError;

/// Capability to drive objects that live inside the remote platform.
///
/// Every call is synchronous and either returns or fails; the core never
/// depends on how the binding reaches the platform.
pub trait RemoteHost {
    /// Root object of the session.
    fn global(&self) -> Handle;

    fn invoke(
        &mut self,
        target: Handle,
        method: &str,
        args: &[RemoteValue],
    ) -> Result<RemoteValue, HostError>;

    fn get_property(&mut self, target: Handle, name: &str) -> Result<RemoteValue, HostError>;

    fn set_property(
        &mut self,
        target: Handle,
        name: &str,
        value: RemoteValue,
    ) -> Result<(), HostError>;

    /// Create a new object through a manager, e.g. `CreateItem` on a catalog
    /// manager.
    fn create_handle(&mut self, manager: Handle, kind: &str) -> Result<Handle, HostError> {
        let value = self.invoke(manager, kind, &[])?;
        expect_handle(kind, value)
    }

    /// Drop the reference held on `handle`.
    fn release(&mut self, _handle: Handle) {}
}

/// Typed shortcuts over [`RemoteHost`].
pub trait RemoteHostExt: RemoteHost {
    fn property_handle(&mut self, target: Handle, name: &str) -> Result<Handle, HostError> {
        let value = self.get_property(target, name)?;
        expect_handle(name, value)
    }

    fn invoke_handle(
        &mut self,
        target: Handle,
        method: &str,
        args: &[RemoteValue],
    ) -> Result<Handle, HostError> {
        let value = self.invoke(target, method, args)?;
        expect_handle(method, value)
    }

    fn invoke_bool(
        &mut self,
        target: Handle,
        method: &str,
        args: &[RemoteValue],
    ) -> Result<bool, HostError> {
        let value = self.invoke(target, method, args)?;
        value.as_boolean().ok_or_else(|| HostError::UnexpectedValue {
            member: method.to_string(),
            actual: value.kind(),
        })
    }

    fn invoke_count(&mut self, target: Handle, method: &str) -> Result<usize, HostError> {
        let value = self.invoke(target, method, &[])?;
        value
            .as_integer()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| HostError::UnexpectedValue {
                member: method.to_string(),
                actual: value.kind(),
            })
    }

    fn property_text(&mut self, target: Handle, name: &str) -> Result<String, HostError> {
        match self.get_property(target, name)? {
            RemoteValue::Text(s) => Ok(s),
            other => Err(HostError::UnexpectedValue {
                member: name.to_string(),
                actual: other.kind(),
            }),
        }
    }
}

impl<H: RemoteHost + ?Sized> RemoteHostExt for H {}

pub(crate) fn expect_handle(member: &str, value: RemoteValue) -> Result<Handle, HostError> {
    value.as_handle().ok_or_else(|| HostError::NotAHandle {
        member: member.to_string(),
        actual: value.kind(),
    })
}
