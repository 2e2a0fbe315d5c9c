//! Per-vendor OLT command templates and SNMP OID profiles.

use serde::Serialize;

use crate::parser::normalize_brand;

/// CLI commands for one vendor, as tera templates over [`OnuContext`]
#[derive(Debug, Clone, Copy)]
pub struct CommandSet {
    pub version: &'static str,
    pub show_onus: &'static str,
    pub running_config: &'static str,
    pub system_status: &'static str,
    pub onu_detail: &'static str,
    pub authorize: &'static str,
    pub unauthorize: &'static str,
    pub reboot: &'static str,
}

/// OID roots for SNMP-managed OLTs. Per-ONU columns are indexed by the
/// port path followed by the ONU id.
#[derive(Debug, Clone, Copy)]
pub struct SnmpProfile {
    /// Serial number tables, tried in order until one yields entries
    pub onu_list: &'static [&'static str],
    pub onu_status: &'static str,
    /// Status column value meaning online
    pub online_value: i64,
    pub rx_power: Option<&'static str>,
    pub tx_power: Option<&'static str>,
    pub distance: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct VendorProfile {
    pub name: &'static str,
    pub commands: CommandSet,
    pub snmp: SnmpProfile,
}

/// Template variables for ONU-scoped commands
#[derive(Debug, Clone, Serialize)]
pub struct OnuContext<'a> {
    pub pon_port: &'a str,
    pub onu_id: i64,
    pub serial_number: &'a str,
}

pub const SYS_DESCR_OID: &str = "1.3.6.1.2.1.1.1.0";

const VSOL: VendorProfile = VendorProfile {
    name: "VSOL",
    commands: CommandSet {
        version: "show version",
        show_onus: "show onu info",
        running_config: "show running-config",
        system_status: "show system",
        onu_detail: "show onu detail-info gpon-onu_{{ pon_port }}:{{ onu_id }}",
        authorize: "onu confirm gpon-onu_{{ pon_port }}:{{ onu_id }} sn {{ serial_number }}",
        unauthorize: "no onu gpon-onu_{{ pon_port }}:{{ onu_id }}",
        reboot: "onu reboot gpon-onu_{{ pon_port }}:{{ onu_id }}",
    },
    snmp: SnmpProfile {
        onu_list: &[
            "1.3.6.1.2.1.155.1.4.1.5.1",
            "1.3.6.1.4.1.37950.1.1.5.12.1.25.1.3",
        ],
        onu_status: "1.3.6.1.4.1.37950.1.1.5.12.1.25.1.4",
        online_value: 1,
        rx_power: Some("1.3.6.1.4.1.37950.1.1.5.12.1.25.1.5"),
        tx_power: Some("1.3.6.1.4.1.37950.1.1.5.12.1.25.1.6"),
        distance: Some("1.3.6.1.4.1.37950.1.1.5.12.1.25.1.7"),
    },
};

const HUAWEI: VendorProfile = VendorProfile {
    name: "Huawei",
    commands: CommandSet {
        version: "display version",
        show_onus: "display ont info 0 all",
        running_config: "display current-configuration",
        system_status: "display device status",
        onu_detail: "display ont info {{ pon_port }} {{ onu_id }}",
        authorize: "ont confirm {{ pon_port }} ontid {{ onu_id }} sn-auth {{ serial_number }}",
        unauthorize: "ont delete {{ pon_port }} {{ onu_id }}",
        reboot: "ont reset {{ pon_port }} {{ onu_id }}",
    },
    snmp: SnmpProfile {
        onu_list: &["1.3.6.1.4.1.2011.6.128.1.1.2.43.1.3"],
        onu_status: "1.3.6.1.4.1.2011.6.128.1.1.2.46.1.15",
        online_value: 1,
        rx_power: Some("1.3.6.1.4.1.2011.6.128.1.1.2.51.1.4"),
        tx_power: Some("1.3.6.1.4.1.2011.6.128.1.1.2.51.1.6"),
        distance: Some("1.3.6.1.4.1.2011.6.128.1.1.2.53.1.1"),
    },
};

const ZTE: VendorProfile = VendorProfile {
    name: "ZTE",
    commands: CommandSet {
        version: "show version-running",
        show_onus: "show gpon onu state",
        running_config: "show running-config",
        system_status: "show processor",
        onu_detail: "show gpon onu detail-info gpon-onu_{{ pon_port }}:{{ onu_id }}",
        authorize: "onu {{ onu_id }} type default sn {{ serial_number }} interface gpon-olt_{{ pon_port }}",
        unauthorize: "no onu {{ onu_id }} interface gpon-olt_{{ pon_port }}",
        reboot: "pon-onu-mng gpon-onu_{{ pon_port }}:{{ onu_id }} reboot",
    },
    snmp: SnmpProfile {
        onu_list: &["1.3.6.1.4.1.3902.1012.3.28.1.1.5"],
        onu_status: "1.3.6.1.4.1.3902.1012.3.28.2.1.5",
        online_value: 3,
        rx_power: Some("1.3.6.1.4.1.3902.1012.3.50.12.1.1.10"),
        tx_power: Some("1.3.6.1.4.1.3902.1012.3.50.12.1.1.9"),
        distance: Some("1.3.6.1.4.1.3902.1012.3.28.2.1.9"),
    },
};

const FIBERHOME: VendorProfile = VendorProfile {
    name: "Fiberhome",
    commands: CommandSet {
        version: "show version",
        show_onus: "show onu-list",
        running_config: "show running-config",
        system_status: "show system",
        onu_detail: "show onu-info {{ pon_port }} {{ onu_id }}",
        authorize: "set whitelist phy_addr address {{ serial_number }} slot {{ pon_port }} onu {{ onu_id }}",
        unauthorize: "set whitelist phy_addr delete {{ serial_number }}",
        reboot: "reset onu {{ pon_port }} {{ onu_id }}",
    },
    snmp: SnmpProfile {
        onu_list: &[],
        onu_status: "",
        online_value: 1,
        rx_power: None,
        tx_power: None,
        distance: None,
    },
};

const BDCOM: VendorProfile = VendorProfile {
    name: "BDCOM",
    commands: CommandSet {
        version: "show version",
        show_onus: "show epon onu-information",
        running_config: "show running-config",
        system_status: "show cpu",
        onu_detail: "show epon onu-information interface epon{{ pon_port }}:{{ onu_id }}",
        authorize: "epon bind-onu sn {{ serial_number }} interface epon{{ pon_port }}:{{ onu_id }}",
        unauthorize: "no epon bind-onu interface epon{{ pon_port }}:{{ onu_id }}",
        reboot: "epon reboot onu interface epon{{ pon_port }}:{{ onu_id }}",
    },
    snmp: SnmpProfile {
        onu_list: &["1.3.6.1.4.1.3320.101.11.1.1.2"],
        onu_status: "1.3.6.1.4.1.3320.101.11.4.1.5",
        online_value: 1,
        rx_power: None,
        tx_power: None,
        distance: None,
    },
};

const GENERIC: VendorProfile = VendorProfile {
    name: "Generic",
    commands: CommandSet {
        version: "show version",
        show_onus: "show onu info",
        running_config: "show running-config",
        system_status: "show system",
        onu_detail: "show onu info {{ pon_port }}:{{ onu_id }}",
        authorize: "onu authorize {{ pon_port }}:{{ onu_id }} sn {{ serial_number }}",
        unauthorize: "no onu {{ pon_port }}:{{ onu_id }}",
        reboot: "onu reboot {{ pon_port }}:{{ onu_id }}",
    },
    snmp: SnmpProfile {
        onu_list: &["1.3.6.1.2.1.155.1.4.1.5.1"],
        onu_status: "",
        online_value: 1,
        rx_power: None,
        tx_power: None,
        distance: None,
    },
};

/// Profile for an OLT brand; unknown brands get the generic profile
pub fn profile_for(brand: &str) -> &'static VendorProfile {
    match normalize_brand(brand).as_str() {
        "vsol" => &VSOL,
        "huawei" => &HUAWEI,
        "zte" => &ZTE,
        "fiberhome" => &FIBERHOME,
        "bdcom" => &BDCOM,
        _ => &GENERIC,
    }
}

/// Render an ONU-scoped command template
pub fn render(template: &str, ctx: &OnuContext<'_>) -> Result<String, tera::Error> {
    let context = tera::Context::from_serialize(ctx)?;
    tera::Tera::one_off(template, &context, false)
}

/// OID suffix addressing one ONU: port path components then the ONU id
pub fn onu_index(pon_port: &str, onu_id: i64) -> String {
    let port = pon_port.replace(['/', ':', '-'], ".");
    if port == "0" || port.is_empty() {
        onu_id.to_string()
    } else {
        format!("{}.{}", port, onu_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_lookup() {
        assert_eq!(profile_for("V-SOL").name, "VSOL");
        assert_eq!(profile_for("huawei").name, "Huawei");
        assert_eq!(profile_for("BDCOM").name, "BDCOM");
        assert_eq!(profile_for("Nokia").name, "Generic");
    }

    #[test]
    fn test_render_onu_command() {
        let ctx = OnuContext {
            pon_port: "1/2",
            onu_id: 7,
            serial_number: "ZTEG11223344",
        };
        let cmd = render(ZTE.commands.reboot, &ctx).unwrap();
        assert_eq!(cmd, "pon-onu-mng gpon-onu_1/2:7 reboot");

        let cmd = render(HUAWEI.commands.authorize, &ctx).unwrap();
        assert_eq!(cmd, "ont confirm 1/2 ontid 7 sn-auth ZTEG11223344");
    }

    #[test]
    fn test_vsol_tries_standard_tree_first() {
        assert_eq!(VSOL.snmp.onu_list[0], "1.3.6.1.2.1.155.1.4.1.5.1");
        assert_eq!(VSOL.snmp.onu_list.len(), 2);
    }

    #[test]
    fn test_onu_index() {
        assert_eq!(onu_index("0/1/2", 5), "0.1.2.5");
        assert_eq!(onu_index("4194304000", 12), "4194304000.12");
        assert_eq!(onu_index("0", 3), "3");
    }
}
