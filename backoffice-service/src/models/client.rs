//! Client model for backoffice-service.

use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Client document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Input for creating a client.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClient {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub address: Option<String>,
    pub enabled: Option<bool>,
}

impl CreateClient {
    pub fn into_client(self, id: String) -> Client {
        Client {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            country: self.country,
            address: self.address,
            enabled: self.enabled.unwrap_or(true),
        }
    }
}

/// Input for updating a client.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClient {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub address: Option<String>,
    pub enabled: Option<bool>,
}

impl UpdateClient {
    /// `$set` body for the supplied fields.
    pub fn to_set(&self) -> Document {
        let mut set = doc! {};
        if let Some(name) = &self.name {
            set.insert("name", name);
        }
        if let Some(email) = &self.email {
            set.insert("email", email);
        }
        if let Some(phone) = &self.phone {
            set.insert("phone", phone);
        }
        if let Some(country) = &self.country {
            set.insert("country", country);
        }
        if let Some(address) = &self.address {
            set.insert("address", address);
        }
        if let Some(enabled) = self.enabled {
            set.insert("enabled", enabled);
        }
        set
    }
}
