//! The interface every COSEM object exposes to the server

use async_trait::async_trait;
use dlms_application::SelectiveAccessDescriptor;
use dlms_core::{DataObject, DlmsResult, ObisCode};

/// A COSEM object addressable by class id and logical name
///
/// Attribute 1 is always the logical name. Errors follow the object model:
/// `AttributeNotFound`, `ReadOnlyAttribute` and `MethodNotFound` for
/// unknown or read-only members, `InvalidData` for a value of the wrong shape.
#[async_trait]
pub trait CosemObject: Send + Sync {
    fn class_id(&self) -> u16;

    fn version(&self) -> u8 {
        0
    }

    fn logical_name(&self) -> ObisCode;

    async fn get_attribute(
        &self,
        attribute_id: u8,
        selective_access: Option<&SelectiveAccessDescriptor>,
    ) -> DlmsResult<DataObject>;

    async fn set_attribute(
        &self,
        attribute_id: u8,
        value: DataObject,
        selective_access: Option<&SelectiveAccessDescriptor>,
    ) -> DlmsResult<()>;

    async fn invoke_method(
        &self,
        method_id: u8,
        parameters: Option<DataObject>,
    ) -> DlmsResult<Option<DataObject>>;
}
