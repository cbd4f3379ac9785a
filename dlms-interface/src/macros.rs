//! Delegation of [`CosemObject`](crate::CosemObject) to an embedded
//! [`CosemInterfaceClass`](crate::CosemInterfaceClass)

/// Implement `CosemObject` for a type whose `$field` is a `CosemInterfaceClass`
macro_rules! delegate_cosem_object {
    ($type:ty, $field:ident) => {
        #[async_trait::async_trait]
        impl $crate::CosemObject for $type {
            fn class_id(&self) -> u16 {
                self.$field.class_id()
            }

            fn version(&self) -> u8 {
                self.$field.version()
            }

            fn logical_name(&self) -> dlms_core::ObisCode {
                self.$field.logical_name()
            }

            async fn get_attribute(
                &self,
                attribute_id: u8,
                selective_access: Option<&dlms_application::SelectiveAccessDescriptor>,
            ) -> dlms_core::DlmsResult<dlms_core::DataObject> {
                $crate::CosemObject::get_attribute(&self.$field, attribute_id, selective_access).await
            }

            async fn set_attribute(
                &self,
                attribute_id: u8,
                value: dlms_core::DataObject,
                selective_access: Option<&dlms_application::SelectiveAccessDescriptor>,
            ) -> dlms_core::DlmsResult<()> {
                $crate::CosemObject::set_attribute(&self.$field, attribute_id, value, selective_access)
                    .await
            }

            async fn invoke_method(
                &self,
                method_id: u8,
                parameters: Option<dlms_core::DataObject>,
            ) -> dlms_core::DlmsResult<Option<dlms_core::DataObject>> {
                $crate::CosemObject::invoke_method(&self.$field, method_id, parameters).await
            }
        }
    };
}
