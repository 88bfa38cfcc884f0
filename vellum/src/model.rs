//! The document model boundary.
//!
//! A [`Model`] is a typed record that the repository maps to one stored
//! document. In memory the identity lives in the `id` field; on the wire it is
//! stored under the reserved `_id` field in its canonical form (see
//! [`DocumentId::normalize`]). The aliasing happens here and nowhere else.

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::common::{type_name, DOC_ID, ID_FIELD, VERSION_FIELD};
use crate::errors::{ErrorKind, VellumError, VellumResult};

/// A typed record stored as one document.
///
/// Implementors serialize with serde and expose their identity and version.
/// The identity is generated by the model (usually `Uuid::new_v4()`) and never
/// changes. The version starts at
/// [`INITIAL_VERSION`](crate::common::INITIAL_VERSION) and is only advanced by
/// the repository after a successful conditional write.
///
/// The identity must serialize under `id` and the version under `version`.
///
/// # Usage
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// pub struct Book {
///     id: Uuid,
///     version: i64,
///     title: String,
/// }
///
/// impl Model for Book {
///     fn id(&self) -> Uuid { self.id }
///     fn version(&self) -> i64 { self.version }
///     fn set_version(&mut self, version: i64) { self.version = version }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the collection backing this model.
    ///
    /// Defaults to the lower-cased type name, without module path or generics.
    fn collection_name() -> String {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base).to_lowercase()
    }

    fn id(&self) -> Uuid;

    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);
}

/// An identity in any of the accepted shapes.
///
/// Every shape normalizes to one canonical wire value with
/// [`normalize`](DocumentId::normalize): a 16 byte UUID binary. Store-native
/// object ids embed into that space by left-padding their 12 bytes with zeros,
/// so the mapping is injective and reversible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentId {
    Uuid(Uuid),
    ObjectId(ObjectId),
    Text(String),
}

impl DocumentId {
    /// Resolves this identity to a UUID.
    ///
    /// Strings are tried as a store-native object id first (24 hex digits) and
    /// then as a UUID in any of its textual forms.
    pub fn to_uuid(&self) -> VellumResult<Uuid> {
        match self {
            DocumentId::Uuid(uuid) => Ok(*uuid),
            DocumentId::ObjectId(oid) => Ok(embed_object_id(oid)),
            DocumentId::Text(text) => {
                if let Ok(oid) = ObjectId::parse_str(text) {
                    return Ok(embed_object_id(&oid));
                }
                Uuid::parse_str(text).map_err(|e| {
                    log::error!("Invalid identifier {:?}: {}", text, e);
                    VellumError::new(
                        &format!("Invalid identifier {:?}: not an object id or a uuid", text),
                        ErrorKind::InvalidIdentifier,
                    )
                })
            }
        }
    }

    /// Produces the canonical wire representation of this identity.
    pub fn normalize(&self) -> VellumResult<Bson> {
        self.to_uuid().map(uuid_to_bson)
    }

    /// Reads an identity back from a wire value.
    pub fn from_bson(value: &Bson) -> VellumResult<DocumentId> {
        match value {
            Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes,
            }) => Uuid::from_slice(bytes).map(DocumentId::Uuid).map_err(|e| {
                VellumError::new(
                    &format!("Invalid uuid binary identifier: {}", e),
                    ErrorKind::InvalidIdentifier,
                )
            }),
            Bson::ObjectId(oid) => Ok(DocumentId::ObjectId(*oid)),
            Bson::String(text) => Ok(DocumentId::Text(text.clone())),
            other => {
                log::error!("Unsupported identifier type {}", type_name(other));
                Err(VellumError::new(
                    &format!("Unsupported identifier type {}", type_name(other)),
                    ErrorKind::InvalidIdentifier,
                ))
            }
        }
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentId::Uuid(uuid) => write!(f, "{}", uuid),
            DocumentId::ObjectId(oid) => write!(f, "{}", oid.to_hex()),
            DocumentId::Text(text) => write!(f, "{}", text),
        }
    }
}

impl From<Uuid> for DocumentId {
    fn from(value: Uuid) -> Self {
        DocumentId::Uuid(value)
    }
}

impl From<&Uuid> for DocumentId {
    fn from(value: &Uuid) -> Self {
        DocumentId::Uuid(*value)
    }
}

impl From<ObjectId> for DocumentId {
    fn from(value: ObjectId) -> Self {
        DocumentId::ObjectId(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        DocumentId::Text(value)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        DocumentId::Text(value.to_string())
    }
}

fn embed_object_id(oid: &ObjectId) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes[4..].copy_from_slice(&oid.bytes());
    Uuid::from_bytes(bytes)
}

pub(crate) fn uuid_to_bson(uuid: Uuid) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Uuid,
        bytes: uuid.as_bytes().to_vec(),
    })
}

/// Encodes a model as its wire document, with the identity under `_id`.
pub fn to_document<T: Model>(item: &T) -> VellumResult<Document> {
    let mut fields = bson::to_document(item).map_err(|e| {
        log::error!("Failed to encode {} as a document: {}", std::any::type_name::<T>(), e);
        VellumError::new(
            &format!(
                "{} does not encode as a document: {}",
                std::any::type_name::<T>(),
                e
            ),
            ErrorKind::ValidationError,
        )
    })?;
    fields.remove(ID_FIELD);
    fields.remove(DOC_ID);

    let mut document = Document::new();
    document.insert(DOC_ID, DocumentId::from(item.id()).normalize()?);
    for (key, value) in fields {
        document.insert(key, value);
    }
    document.insert(VERSION_FIELD, item.version());
    Ok(document)
}

/// Rehydrates a model from its wire document.
pub fn from_document<T: Model>(mut document: Document) -> VellumResult<T> {
    let id = match document.remove(DOC_ID) {
        Some(value) => DocumentId::from_bson(&value)?.to_uuid()?,
        None => {
            log::error!("Document has no {} field", DOC_ID);
            return Err(VellumError::new(
                &format!("Document has no {} field", DOC_ID),
                ErrorKind::ObjectMappingError,
            ));
        }
    };
    document.insert(ID_FIELD, id.to_string());
    Ok(bson::from_document(document)?)
}
