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

//! Chassis resource with synthetic power and thermal telemetry. The VM has
//! no sensors; the values are stable plausible constants, with consumption
//! tracking the cached power state.

use axum::Router;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use serde_json::json;

use crate::json::{JsonExt, JsonPatch, not_found};
use crate::resource::{Collection, Resource, status_ok};
use crate::state::AppState;

const POWER_CONSUMED_ON_WATTS: f64 = 120.0;
const POWER_CONSUMED_OFF_WATTS: f64 = 8.0;
const CPU_TEMP_CELSIUS: f64 = 42.0;
const SYSTEM_TEMP_CELSIUS: f64 = 35.0;
const FAN_RPM: i64 = 4200;

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route("/redfish/v1/Chassis", get(get_collection))
        .route("/redfish/v1/Chassis/{chassis_id}", get(get_chassis))
        .route("/redfish/v1/Chassis/{chassis_id}/Power", get(get_power))
        .route("/redfish/v1/Chassis/{chassis_id}/Thermal", get(get_thermal))
        .route(
            "/redfish/v1/Chassis/{chassis_id}/NetworkAdapters",
            get(get_network_adapters),
        )
        .route(
            "/redfish/v1/Chassis/{chassis_id}/NetworkAdapters/{adapter_id}",
            get(get_network_adapter),
        )
}

fn chassis_resource(chassis_id: &str) -> Resource<'static> {
    Resource::new(
        format!("/redfish/v1/Chassis/{chassis_id}"),
        "#Chassis.v1_9_0.Chassis",
        "Chassis.Chassis",
        chassis_id.to_string(),
        format!("Chassis {chassis_id}"),
    )
}

async fn get_collection(State(state): State<AppState>) -> Response {
    let members = vec![chassis_resource(&state.chassis_id()).entity_ref()];
    Collection::new("/redfish/v1/Chassis", "ChassisCollection", "Chassis Collection")
        .with_members(&members)
        .into_ok_response()
}

async fn get_chassis(State(state): State<AppState>, Path(chassis_id): Path<String>) -> Response {
    if chassis_id != state.chassis_id() {
        return not_found();
    }
    let vm_name = state.vm_name().to_string();
    let base = format!("/redfish/v1/Chassis/{chassis_id}");
    chassis_resource(&chassis_id)
        .json_patch()
        .patch(json!({
            "Description": format!("Virtual chassis for VMware VM {vm_name}"),
            "ChassisType": "RackMount",
            "Manufacturer": "VMware, Inc.",
            "Model": "VMware Virtual Platform",
            "SKU": "VMware VM",
            "SerialNumber": format!("VMware-{vm_name}-Chassis"),
            "PartNumber": "440BX",
            "PowerState": state.vm.power_state().as_redfish(),
            "Status": status_ok(),
            "Power": { "@odata.id": format!("{base}/Power") },
            "Thermal": { "@odata.id": format!("{base}/Thermal") },
            "NetworkAdapters": { "@odata.id": format!("{base}/NetworkAdapters") },
            "Links": {
                "ComputerSystems": [ { "@odata.id": format!("/redfish/v1/Systems/{vm_name}") } ],
                "ManagedBy": [
                    { "@odata.id": format!("/redfish/v1/Managers/{}", state.manager_id()) },
                ],
            },
        }))
        .into_ok_response()
}

async fn get_power(State(state): State<AppState>, Path(chassis_id): Path<String>) -> Response {
    if chassis_id != state.chassis_id() {
        return not_found();
    }
    let consumed = if state.vm.power_state().is_on() {
        POWER_CONSUMED_ON_WATTS
    } else {
        POWER_CONSUMED_OFF_WATTS
    };
    let base = format!("/redfish/v1/Chassis/{chassis_id}/Power");
    Resource::new(
        base.clone(),
        "#Power.v1_5_0.Power",
        "Power.Power",
        "Power",
        "Power",
    )
    .json_patch()
    .patch(json!({
        "PowerControl": [{
            "@odata.id": format!("{base}#/PowerControl/0"),
            "MemberId": "0",
            "Name": "System Power Control",
            "PowerConsumedWatts": consumed,
            "PowerCapacityWatts": 650.0,
            "PowerMetrics": {
                "IntervalInMin": 1,
                "AverageConsumedWatts": consumed,
                "MaxConsumedWatts": consumed + 35.0,
                "MinConsumedWatts": POWER_CONSUMED_OFF_WATTS,
            },
            "Status": status_ok(),
        }],
        "Voltages": [
            {
                "@odata.id": format!("{base}#/Voltages/0"),
                "MemberId": "0",
                "Name": "VRM1 Voltage",
                "SensorNumber": 11,
                "ReadingVolts": 12.1,
                "UpperThresholdCritical": 13.0,
                "LowerThresholdCritical": 11.0,
                "PhysicalContext": "VoltageRegulator",
                "Status": status_ok(),
            },
            {
                "@odata.id": format!("{base}#/Voltages/1"),
                "MemberId": "1",
                "Name": "3.3V Rail",
                "SensorNumber": 12,
                "ReadingVolts": 3.31,
                "UpperThresholdCritical": 3.6,
                "LowerThresholdCritical": 3.0,
                "PhysicalContext": "SystemBoard",
                "Status": status_ok(),
            },
        ],
        "PowerSupplies": [{
            "@odata.id": format!("{base}#/PowerSupplies/0"),
            "MemberId": "0",
            "Name": "Power Supply 1",
            "PowerSupplyType": "AC",
            "LineInputVoltage": 230,
            "PowerCapacityWatts": 650,
            "Manufacturer": "VMware, Inc.",
            "Model": "Virtual PSU",
            "FirmwareVersion": "1.00",
            "SerialNumber": "VPSU-0001",
            "Status": status_ok(),
        }],
    }))
    .into_ok_response()
}

async fn get_thermal(State(state): State<AppState>, Path(chassis_id): Path<String>) -> Response {
    if chassis_id != state.chassis_id() {
        return not_found();
    }
    let base = format!("/redfish/v1/Chassis/{chassis_id}/Thermal");
    Resource::new(
        base.clone(),
        "#Thermal.v1_5_0.Thermal",
        "Thermal.Thermal",
        "Thermal",
        "Thermal",
    )
    .json_patch()
    .patch(json!({
        "Temperatures": [
            {
                "@odata.id": format!("{base}#/Temperatures/0"),
                "MemberId": "0",
                "Name": "CPU1 Temp",
                "SensorNumber": 1,
                "ReadingCelsius": CPU_TEMP_CELSIUS,
                "UpperThresholdNonCritical": 85.0,
                "UpperThresholdCritical": 95.0,
                "PhysicalContext": "CPU",
                "Status": status_ok(),
            },
            {
                "@odata.id": format!("{base}#/Temperatures/1"),
                "MemberId": "1",
                "Name": "System Board Temp",
                "SensorNumber": 2,
                "ReadingCelsius": SYSTEM_TEMP_CELSIUS,
                "UpperThresholdNonCritical": 70.0,
                "UpperThresholdCritical": 80.0,
                "PhysicalContext": "SystemBoard",
                "Status": status_ok(),
            },
        ],
        "Fans": [
            {
                "@odata.id": format!("{base}#/Fans/0"),
                "MemberId": "0",
                "Name": "System Fan 1",
                "Reading": FAN_RPM,
                "ReadingUnits": "RPM",
                "LowerThresholdCritical": 500,
                "PhysicalContext": "SystemBoard",
                "Status": status_ok(),
            },
            {
                "@odata.id": format!("{base}#/Fans/1"),
                "MemberId": "1",
                "Name": "System Fan 2",
                "Reading": FAN_RPM,
                "ReadingUnits": "RPM",
                "LowerThresholdCritical": 500,
                "PhysicalContext": "SystemBoard",
                "Status": status_ok(),
            },
        ],
    }))
    .into_ok_response()
}

async fn get_network_adapters(
    State(state): State<AppState>,
    Path(chassis_id): Path<String>,
) -> Response {
    if chassis_id != state.chassis_id() {
        return not_found();
    }
    let inventory = state.inventory().await;
    let base = format!("/redfish/v1/Chassis/{chassis_id}/NetworkAdapters");
    let members: Vec<serde_json::Value> = (1..=inventory.nics.len().max(1))
        .map(|index| json!({ "@odata.id": format!("{base}/{index}") }))
        .collect();
    Collection::new(base, "NetworkAdapterCollection", "Network Adapter Collection")
        .with_members(&members)
        .into_ok_response()
}

async fn get_network_adapter(
    State(state): State<AppState>,
    Path((chassis_id, adapter_id)): Path<(String, String)>,
) -> Response {
    if chassis_id != state.chassis_id() {
        return not_found();
    }
    let inventory = state.inventory().await;
    let Ok(index) = adapter_id.parse::<usize>() else {
        return not_found();
    };
    let Some(nic) = index.checked_sub(1).and_then(|i| inventory.nics.get(i)) else {
        return not_found();
    };
    Resource::new(
        format!("/redfish/v1/Chassis/{chassis_id}/NetworkAdapters/{adapter_id}"),
        "#NetworkAdapter.v1_7_0.NetworkAdapter",
        "NetworkAdapter.NetworkAdapter",
        adapter_id.clone(),
        nic.name.clone(),
    )
    .json_patch()
    .patch(json!({
        "Manufacturer": "VMware, Inc.",
        "Model": "VMXNET3 Ethernet Adapter",
        "SerialNumber": nic
            .mac_address
            .as_deref()
            .map(|mac| mac.replace(':', ""))
            .unwrap_or_else(|| format!("VMXNET-{adapter_id}")),
        "Status": status_ok(),
    }))
    .into_ok_response()
}
