//! Generic COSEM interface class
//!
//! `CosemInterfaceClass` holds a logical name, a class id and two id-keyed
//! registries. Each attribute has a getter and optionally a setter; each
//! method has a handler. Concrete classes build one of these over their own
//! state and add domain validation inside the handlers.

use crate::access::AccessMode;
use crate::object::CosemObject;
use async_trait::async_trait;
use dlms_application::SelectiveAccessDescriptor;
use dlms_core::{DataAccessResult, DataObject, DataObjectType, DlmsError, DlmsResult, ObisCode};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Attribute 1 of every interface class
pub const LOGICAL_NAME_ATTRIBUTE: u8 = 1;

pub type Getter = Arc<dyn Fn() -> DlmsResult<DataObject> + Send + Sync>;
pub type Setter = Arc<dyn Fn(DataObject) -> DlmsResult<()> + Send + Sync>;
pub type MethodHandler = Arc<dyn Fn(Option<DataObject>) -> DlmsResult<Option<DataObject>> + Send + Sync>;

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// One registered attribute
#[derive(Clone)]
pub struct Attribute {
    pub name: String,
    /// `None` accepts any value type
    pub data_type: Option<DataObjectType>,
    pub access: AccessMode,
    getter: Getter,
    setter: Option<Setter>,
}

impl Attribute {
    pub fn read_only<G>(name: impl Into<String>, data_type: Option<DataObjectType>, getter: G) -> Self
    where
        G: Fn() -> DlmsResult<DataObject> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            data_type,
            access: AccessMode::ReadOnly,
            getter: Arc::new(getter),
            setter: None,
        }
    }

    pub fn read_write<G, S>(
        name: impl Into<String>,
        data_type: Option<DataObjectType>,
        getter: G,
        setter: S,
    ) -> Self
    where
        G: Fn() -> DlmsResult<DataObject> + Send + Sync + 'static,
        S: Fn(DataObject) -> DlmsResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            data_type,
            access: AccessMode::ReadWrite,
            getter: Arc::new(getter),
            setter: Some(Arc::new(setter)),
        }
    }

    /// Override the advertised access mode
    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("access", &self.access)
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// One registered method
#[derive(Clone)]
pub struct Method {
    pub name: String,
    handler: MethodHandler,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("name", &self.name).finish()
    }
}

/// Registry-backed COSEM object
#[derive(Debug, Clone)]
pub struct CosemInterfaceClass {
    class_id: u16,
    version: u8,
    logical_name: ObisCode,
    attributes: BTreeMap<u8, Attribute>,
    methods: BTreeMap<u8, Method>,
}

impl CosemInterfaceClass {
    /// Create an object with only attribute 1 (logical name) registered
    pub fn new(class_id: u16, version: u8, logical_name: ObisCode) -> Self {
        let name = logical_name;
        let mut attributes = BTreeMap::new();
        attributes.insert(
            LOGICAL_NAME_ATTRIBUTE,
            Attribute::read_only("logical_name", Some(DataObjectType::OctetString), move || {
                Ok(DataObject::from_logical_name(&name))
            }),
        );
        Self {
            class_id,
            version,
            logical_name,
            attributes,
            methods: BTreeMap::new(),
        }
    }

    /// Register an attribute
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if `attribute_id` is 0 or already registered
    pub fn register_attribute(&mut self, attribute_id: u8, attribute: Attribute) -> DlmsResult<()> {
        if attribute_id == 0 || self.attributes.contains_key(&attribute_id) {
            return Err(DlmsError::InvalidState(format!(
                "Attribute {} of {} cannot be registered twice",
                attribute_id, self.logical_name
            )));
        }
        self.attributes.insert(attribute_id, attribute);
        Ok(())
    }

    /// Register a method handler
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if `method_id` is 0 or already registered
    pub fn register_method<H>(&mut self, method_id: u8, name: impl Into<String>, handler: H) -> DlmsResult<()>
    where
        H: Fn(Option<DataObject>) -> DlmsResult<Option<DataObject>> + Send + Sync + 'static,
    {
        if method_id == 0 || self.methods.contains_key(&method_id) {
            return Err(DlmsError::InvalidState(format!(
                "Method {} of {} cannot be registered twice",
                method_id, self.logical_name
            )));
        }
        self.methods.insert(
            method_id,
            Method {
                name: name.into(),
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    pub fn class_id(&self) -> u16 {
        self.class_id
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn logical_name(&self) -> ObisCode {
        self.logical_name
    }

    pub fn attribute(&self, attribute_id: u8) -> Option<&Attribute> {
        self.attributes.get(&attribute_id)
    }

    pub fn attribute_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.attributes.keys().copied()
    }

    pub fn method_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.methods.keys().copied()
    }

    /// Read an attribute through its getter
    ///
    /// # Errors
    ///
    /// * `AttributeNotFound` if nothing is registered under `attribute_id`
    /// * `AccessDenied` if the attribute is not readable
    pub fn get(&self, attribute_id: u8) -> DlmsResult<DataObject> {
        let attribute = self
            .attributes
            .get(&attribute_id)
            .ok_or(DlmsError::AttributeNotFound(attribute_id))?;
        if !attribute.access.can_read() {
            return Err(DlmsError::AccessDenied(format!(
                "Attribute {} ({}) of {} is not readable",
                attribute_id, attribute.name, self.logical_name
            )));
        }
        (attribute.getter)()
    }

    /// Write an attribute through its setter
    ///
    /// # Errors
    ///
    /// * `AttributeNotFound` if nothing is registered under `attribute_id`
    /// * `ReadOnlyAttribute` if the attribute has no setter or its access mode
    ///   does not allow writing
    /// * `InvalidData` if the value has the wrong type or the setter rejects it
    pub fn set(&self, attribute_id: u8, value: DataObject) -> DlmsResult<()> {
        let attribute = self
            .attributes
            .get(&attribute_id)
            .ok_or(DlmsError::AttributeNotFound(attribute_id))?;
        let Some(setter) = &attribute.setter else {
            return Err(DlmsError::ReadOnlyAttribute(attribute_id));
        };
        if !attribute.access.can_write() {
            log::debug!(
                "{} attribute {} ({}) is {:?}, write refused",
                self.logical_name,
                attribute_id,
                attribute.name,
                attribute.access
            );
            return Err(DlmsError::ReadOnlyAttribute(attribute_id));
        }
        if let Some(expected) = attribute.data_type {
            if value.get_type() != expected {
                return Err(DlmsError::InvalidData(format!(
                    "Attribute {} ({}) expects {:?}, got {:?}",
                    attribute_id,
                    attribute.name,
                    expected,
                    value.get_type()
                )));
            }
        }
        setter(value)?;
        log::debug!("{} attribute {} ({}) written", self.logical_name, attribute_id, attribute.name);
        Ok(())
    }

    /// Run a method
    ///
    /// # Errors
    ///
    /// Returns `MethodNotFound` if nothing is registered under `method_id`,
    /// otherwise whatever the handler returns
    pub fn execute(&self, method_id: u8, parameters: Option<DataObject>) -> DlmsResult<Option<DataObject>> {
        let method = self
            .methods
            .get(&method_id)
            .ok_or(DlmsError::MethodNotFound(method_id))?;
        log::debug!("{} method {} ({}) invoked", self.logical_name, method_id, method.name);
        (method.handler)(parameters)
    }
}

fn reject_selective_access(selective_access: Option<&SelectiveAccessDescriptor>) -> DlmsResult<()> {
    match selective_access {
        Some(_) => Err(DlmsError::DataAccess(DataAccessResult::ScopeOfAccessViolated)),
        None => Ok(()),
    }
}

#[async_trait]
impl CosemObject for CosemInterfaceClass {
    fn class_id(&self) -> u16 {
        self.class_id
    }

    fn version(&self) -> u8 {
        self.version
    }

    fn logical_name(&self) -> ObisCode {
        self.logical_name
    }

    async fn get_attribute(
        &self,
        attribute_id: u8,
        selective_access: Option<&SelectiveAccessDescriptor>,
    ) -> DlmsResult<DataObject> {
        reject_selective_access(selective_access)?;
        self.get(attribute_id)
    }

    async fn set_attribute(
        &self,
        attribute_id: u8,
        value: DataObject,
        selective_access: Option<&SelectiveAccessDescriptor>,
    ) -> DlmsResult<()> {
        reject_selective_access(selective_access)?;
        self.set(attribute_id, value)
    }

    async fn invoke_method(
        &self,
        method_id: u8,
        parameters: Option<DataObject>,
    ) -> DlmsResult<Option<DataObject>> {
        self.execute(method_id, parameters)
    }
}
