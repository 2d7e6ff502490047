/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

//! Minimal Redfish resource and collection builders. Every payload the
//! service emits starts from one of these so the `@odata.*` triplet is
//! never forgotten.

use std::borrow::Cow;

use serde_json::json;

use crate::json::JsonPatch;

pub struct Resource<'a> {
    pub odata_id: Cow<'a, str>,
    pub odata_type: Cow<'a, str>,
    pub context: Cow<'a, str>,
    pub id: Cow<'a, str>,
    pub name: Cow<'a, str>,
}

impl<'a> Resource<'a> {
    pub fn new(
        odata_id: impl Into<Cow<'a, str>>,
        odata_type: &'a str,
        schema: &str,
        id: impl Into<Cow<'a, str>>,
        name: impl Into<Cow<'a, str>>,
    ) -> Self {
        Self {
            odata_id: odata_id.into(),
            odata_type: Cow::Borrowed(odata_type),
            context: Cow::Owned(format!("/redfish/v1/$metadata#{schema}")),
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn entity_ref(&self) -> serde_json::Value {
        json!({ "@odata.id": self.odata_id })
    }
}

impl JsonPatch for Resource<'_> {
    fn json_patch(&self) -> serde_json::Value {
        json!({
            "@odata.id": self.odata_id,
            "@odata.type": self.odata_type,
            "@odata.context": self.context,
            "Id": self.id,
            "Name": self.name,
        })
    }
}

pub struct Collection<'a> {
    pub odata_id: Cow<'a, str>,
    pub odata_type: Cow<'a, str>,
    pub context: Cow<'a, str>,
    pub name: Cow<'a, str>,
}

impl<'a> Collection<'a> {
    pub fn new(
        odata_id: impl Into<Cow<'a, str>>,
        schema: &'a str,
        name: &'a str,
    ) -> Self {
        Self {
            odata_id: odata_id.into(),
            odata_type: Cow::Owned(format!("#{schema}.{schema}")),
            context: Cow::Owned(format!("/redfish/v1/$metadata#{schema}.{schema}")),
            name: Cow::Borrowed(name),
        }
    }

    pub fn nav_property(&self, name: &str) -> serde_json::Value {
        json!({ name: { "@odata.id": self.odata_id } })
    }

    pub fn with_members(&self, members: &[serde_json::Value]) -> serde_json::Value {
        use crate::json::JsonExt;
        self.json_patch().patch(json!({
            "Members": members,
            "Members@odata.count": members.len(),
        }))
    }
}

impl JsonPatch for Collection<'_> {
    fn json_patch(&self) -> serde_json::Value {
        json!({
            "@odata.id": self.odata_id,
            "@odata.type": self.odata_type,
            "@odata.context": self.context,
            "Name": self.name,
        })
    }
}

pub fn status_ok() -> serde_json::Value {
    json!({ "State": "Enabled", "Health": "OK" })
}

pub fn status_ok_rollup() -> serde_json::Value {
    json!({ "State": "Enabled", "Health": "OK", "HealthRollup": "OK" })
}

#[cfg(test)]
mod tests {
    use crate::json::JsonExt;

    use super::*;

    #[test]
    fn resource_payload_carries_the_odata_triplet() {
        let resource = Resource::new(
            "/redfish/v1/Systems/worker-1",
            "#ComputerSystem.v1_13_0.ComputerSystem",
            "ComputerSystem.ComputerSystem",
            "worker-1",
            "worker-1",
        );
        let payload = resource.json_patch();
        assert_eq!(payload["@odata.id"], "/redfish/v1/Systems/worker-1");
        assert_eq!(payload["@odata.type"], "#ComputerSystem.v1_13_0.ComputerSystem");
        assert_eq!(
            payload["@odata.context"],
            "/redfish/v1/$metadata#ComputerSystem.ComputerSystem"
        );
        assert_eq!(payload["Id"], "worker-1");
    }

    #[test]
    fn collection_counts_members() {
        let collection = Collection::new(
            "/redfish/v1/Systems",
            "ComputerSystemCollection",
            "Computer System Collection",
        );
        let members = vec![serde_json::json!({"@odata.id": "/redfish/v1/Systems/worker-1"})];
        let payload = collection.with_members(&members);
        assert_eq!(payload["Members@odata.count"], 1);
        assert_eq!(
            payload["@odata.type"],
            "#ComputerSystemCollection.ComputerSystemCollection"
        );
    }

    #[test]
    fn nav_property_links_by_identifier() {
        let collection = Collection::new("/redfish/v1/Systems", "ComputerSystemCollection", "x");
        let linked = serde_json::json!({}).patch(collection.nav_property("Systems"));
        assert_eq!(linked["Systems"]["@odata.id"], "/redfish/v1/Systems");
    }

    #[test]
    fn entity_ref_is_a_bare_link() {
        let resource = Resource::new(
            "/redfish/v1/Systems/worker-1",
            "#ComputerSystem.v1_13_0.ComputerSystem",
            "ComputerSystem.ComputerSystem",
            "worker-1",
            "worker-1",
        );
        assert_eq!(
            resource.entity_ref(),
            serde_json::json!({"@odata.id": "/redfish/v1/Systems/worker-1"})
        );
    }
}
