//! Resource catalogue
//!
//! Schemas of the resources exposed through [`Client`](crate::Client)
//! accessors. Other resources are declared the same way and reached with
//! [`Client::endpoint`](crate::Client::endpoint).

use crate::model::{Entity, EntitySchema, FieldDef, FieldValue};

static LOCATION_FIELDS: &[FieldDef] = &[
    FieldDef::readonly("id"),
    FieldDef::writable("name"),
    FieldDef::writable("country"),
];

/// A data center.
pub static LOCATION: EntitySchema = EntitySchema::new("Location", LOCATION_FIELDS)
    .with_display_field("name");

static IP_FIELDS: &[FieldDef] = &[
    FieldDef::readonly("id"),
    FieldDef::writable("address"),
    FieldDef::writable("family"),
];

/// An IP address assignment.
pub static IP: EntitySchema = EntitySchema::new("Ip", IP_FIELDS)
    .with_display_field("address");

static SERVER_FIELDS: &[FieldDef] = &[
    FieldDef::readonly("id"),
    FieldDef::writable("name"),
    FieldDef::readonly("state"),
    FieldDef::readonly("power"),
    FieldDef::writable("location").child(&LOCATION).collapse_to("location_id"),
    FieldDef::alias("cloud", "location"),
    FieldDef::writable("ips").collection(&IP).collapse_to("ip_ids"),
    FieldDef::writable("labels"),
    FieldDef::readonly("created_at").timestamp(),
    FieldDef::readonly("updated_at").timestamp(),
    FieldDef::readonly("location_name").getter(location_name),
];

/// A virtual server.
///
/// `location` is written back as `location_id` and also answers to `cloud`;
/// `ips` is written back as `ip_ids`.
pub static SERVER: EntitySchema = EntitySchema::new("Server", SERVER_FIELDS)
    .with_display_field("name");

fn location_name(server: &Entity) -> FieldValue {
    server.peek("location.name").unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_server_write_form() {
        let server = Entity::from_wire(
            &SERVER,
            &json!({
                "id": 7,
                "name": "web-1",
                "state": "running",
                "cloud": {"id": 3, "name": "Falkenstein", "country": "DE"},
                "ips": [{"id": 10, "address": "10.0.0.1"}, {"id": 11}],
                "labels": ["prod"],
                "created_at": "2024-03-01 12:00:00",
            }),
        )
        .unwrap();

        assert_eq!(server.to_string(), "web-1");
        assert_eq!(
            server.peek("location_name").unwrap().as_str(),
            Some("Falkenstein")
        );
        assert_eq!(
            serde_json::Value::Object(server.to_collapsed_array().unwrap()),
            json!({
                "ip_ids": [10, 11],
                "labels": ["prod"],
                "location_id": 3,
                "name": "web-1",
            })
        );
    }
}
