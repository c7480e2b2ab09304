use crate::codec::{self, CodecError, EncodeReport, Encoding};
use crate::value::{self, Attributes, PpsValue, ValueError};
use serde::{Serialize, Serializer};
use tracing::warn;

pub const ROOT_OBJECT_NAME: &str = "@";

const CLIENT_ID_SEPARATOR: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    #[default]
    Undefined,
    Incomplete,
    Created,
    Deleted,
    Truncated,
    Purged,
}

impl ObjectStatus {
    pub fn from_flag(flag: char) -> Option<Self> {
        match flag {
            '+' => Some(Self::Created),
            '-' => Some(Self::Deleted),
            '#' => Some(Self::Truncated),
            '*' => Some(Self::Purged),
            '!' => Some(Self::Incomplete),
            _ => None,
        }
    }

    pub fn flag(self) -> Option<char> {
        match self {
            Self::Undefined => None,
            Self::Created => Some('+'),
            Self::Deleted => Some('-'),
            Self::Truncated => Some('#'),
            Self::Purged => Some('*'),
            Self::Incomplete => Some('!'),
        }
    }

    pub fn is_structural(self) -> bool {
        self != Self::Undefined
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PpsMessage {
    object_name: String,
    client_id: Option<String>,
    status: ObjectStatus,
    attributes: Attributes,
}

impl PpsMessage {
    pub fn new(object_name: impl Into<String>, attributes: Attributes) -> Self {
        let object_name = object_name.into();
        Self {
            object_name: if object_name.is_empty() {
                ROOT_OBJECT_NAME.to_string()
            } else {
                object_name
            },
            client_id: None,
            status: ObjectStatus::Undefined,
            attributes,
        }
    }

    pub fn from_raw_name(raw_name: &str, attributes: Attributes) -> Result<Self, CodecError> {
        let mut parts = raw_name.split(CLIENT_ID_SEPARATOR);
        let object_name = parts.next().unwrap_or_default();
        let client_id = parts.next();
        if parts.next().is_some() {
            return Err(CodecError::InvalidObjectName(raw_name.to_string()));
        }
        let message = Self::new(object_name, attributes);
        Ok(match client_id {
            Some(client_id) => message.with_client_id(client_id),
            None => message,
        })
    }

    pub fn status_only(raw_name: &str, status: ObjectStatus) -> Result<Self, CodecError> {
        let mut message = Self::from_raw_name(raw_name, Attributes::new())?;
        message.status = status;
        Ok(message)
    }

    pub fn from_serialize<T: Serialize + ?Sized>(
        object_name: impl Into<String>,
        value: &T,
    ) -> Result<Self, ValueError> {
        Ok(Self::new(object_name, value::to_attributes(value)?))
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        self.client_id = (!client_id.is_empty()).then_some(client_id);
        self
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn name(&self) -> String {
        match &self.client_id {
            Some(client_id) => format!("{}{}{}", self.object_name, CLIENT_ID_SEPARATOR, client_id),
            None => self.object_name.clone(),
        }
    }

    pub fn status(&self) -> ObjectStatus {
        self.status
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn into_attributes(self) -> Attributes {
        self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&PpsValue> {
        self.attributes.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PpsValue>) {
        let key = key.into();
        if self.status.is_structural() {
            warn!(
                event = "pps_message_insert_ignored",
                object = %self.name(),
                key = %key,
                status = ?self.status
            );
            return;
        }
        self.attributes.insert(key, value.into());
    }

    pub fn encode(&self, encoding: Encoding) -> EncodeReport {
        codec::encode_message(self, encoding)
    }
}

impl Serialize for PpsMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Wire<'a> {
            name: String,
            object_name: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            client_id: Option<&'a str>,
            status: ObjectStatus,
            attributes: &'a Attributes,
        }

        Wire {
            name: self.name(),
            object_name: &self.object_name,
            client_id: self.client_id.as_deref(),
            status: self.status,
            attributes: &self.attributes,
        }
        .serialize(serializer)
    }
}
