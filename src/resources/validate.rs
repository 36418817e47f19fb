//! Names, enumerations and lookup tables shared by the resource schemas.

use crate::schema::Validator;

/// Single and flexible server names: 3 to 63 lowercase letters, digits and
/// hyphens, not starting or ending with a hyphen.
pub fn server_name() -> Validator {
    Validator::matches(
        r"^[0-9a-z][-0-9a-z]{1,61}[0-9a-z]$",
        "must be 3 to 63 lowercase letters, numbers and hyphens, and cannot start or end with a hyphen",
    )
}

/// Resource group names.
pub fn resource_group_name() -> Validator {
    Validator::matches(
        r"^[-\w._()]{0,89}[-\w_()]$",
        "may only contain alphanumerics, underscores, parentheses, hyphens and periods, cannot end in a period and must be at most 90 characters",
    )
}

/// Database names.
pub fn database_name() -> Validator {
    Validator::matches(
        r"^[-\w._]{1,63}$",
        "must be 1 to 63 letters, numbers, underscores, hyphens and periods",
    )
}

/// Firewall rule names.
pub fn firewall_rule_name() -> Validator {
    Validator::matches(
        r"^[-\w.]{1,128}$",
        "must be 1 to 128 letters, numbers, underscores, hyphens and periods",
    )
}

/// Virtual network rule names.
pub fn virtual_network_rule_name() -> Validator {
    Validator::matches(
        r"^[a-zA-Z0-9]([-a-zA-Z0-9_.]{0,126}[a-zA-Z0-9_])?$",
        "must be 1 to 128 characters, start with a letter or number, end with a letter, number or underscore, and otherwise contain only letters, numbers, underscores, periods and hyphens",
    )
}

/// Flexible server SKU names such as `GP_Standard_D2s_v3`.
pub fn flexible_server_sku_name() -> Validator {
    Validator::matches(
        r"^(B|GP|MO)_Standard_[A-Z][0-9A-Za-z]*(_v[0-9]+)?$",
        "must be a tier prefix (B_, GP_ or MO_) followed by a Standard VM size, e.g. GP_Standard_D2s_v3",
    )
}

/// Single server SKUs, ordered from smallest to largest within each tier.
pub const SINGLE_SERVER_SKUS: &[&str] = &[
    "B_Gen4_1",
    "B_Gen4_2",
    "B_Gen5_1",
    "B_Gen5_2",
    "GP_Gen4_2",
    "GP_Gen4_4",
    "GP_Gen4_8",
    "GP_Gen4_16",
    "GP_Gen4_32",
    "GP_Gen5_2",
    "GP_Gen5_4",
    "GP_Gen5_8",
    "GP_Gen5_16",
    "GP_Gen5_32",
    "GP_Gen5_64",
    "MO_Gen5_2",
    "MO_Gen5_4",
    "MO_Gen5_8",
    "MO_Gen5_16",
    "MO_Gen5_32",
];

/// Single server major versions.
pub const SINGLE_SERVER_VERSIONS: &[&str] = &["9.5", "9.6", "10", "10.0", "10.2", "11"];

/// Flexible server major versions.
pub const FLEXIBLE_SERVER_VERSIONS: &[&str] = &["11", "12", "13", "14", "15", "16"];

/// Flexible server storage sizes in MiB.
pub const FLEXIBLE_STORAGE_MB: &[i64] = &[
    32768, 65536, 131072, 262144, 524288, 1048576, 2097152, 4193280, 4194304, 8388608, 16777216,
    33553408,
];

/// Flexible server disk performance tiers.
pub const STORAGE_TIERS: &[&str] = &[
    "P4", "P6", "P10", "P15", "P20", "P30", "P40", "P50", "P60", "P70", "P80",
];

/// The performance tiers a flexible server disk of one size accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageTiers {
    /// Tier assigned when none is configured.
    pub default: &'static str,
    /// Every accepted tier.
    pub valid: &'static [&'static str],
}

impl StorageTiers {
    /// Whether `tier` is accepted for this size.
    pub fn accepts(&self, tier: &str) -> bool {
        self.valid.contains(&tier)
    }
}

const UP_TO_P50: &[&str] = &["P4", "P6", "P10", "P15", "P20", "P30", "P40", "P50"];
const FROM_P60: &[&str] = &["P60", "P70", "P80"];

/// Tiers for a storage size, `None` for sizes the service does not offer.
pub fn storage_tiers(storage_mb: i64) -> Option<StorageTiers> {
    let (default, valid): (&str, &[&str]) = match storage_mb {
        32768 => ("P4", UP_TO_P50),
        65536 => ("P6", &UP_TO_P50[1..]),
        131072 => ("P10", &UP_TO_P50[2..]),
        262144 => ("P15", &UP_TO_P50[3..]),
        524288 => ("P20", &UP_TO_P50[4..]),
        1048576 => ("P30", &UP_TO_P50[5..]),
        2097152 => ("P40", &UP_TO_P50[6..]),
        4193280 | 4194304 => ("P50", &UP_TO_P50[7..]),
        8388608 => ("P60", FROM_P60),
        16777216 => ("P70", &FROM_P60[1..]),
        33553408 => ("P80", &FROM_P60[2..]),
        _ => return None,
    };
    Some(StorageTiers { default, valid })
}

/// Position of a single server SKU in [`SINGLE_SERVER_SKUS`].
pub fn single_server_sku_rank(sku: &str) -> Option<usize> {
    SINGLE_SERVER_SKUS.iter().position(|s| *s == sku)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_name() {
        let v = server_name();
        assert!(v.check("name", &json!("pg-prod-01")).is_ok());
        assert!(v.check("name", &json!("ab")).is_err());
        assert!(v.check("name", &json!("-pg")).is_err());
        assert!(v.check("name", &json!("PG")).is_err());
    }

    #[test]
    fn test_flexible_sku_name() {
        let v = flexible_server_sku_name();
        assert!(v.check("sku_name", &json!("GP_Standard_D2s_v3")).is_ok());
        assert!(v.check("sku_name", &json!("B_Standard_B1ms")).is_ok());
        assert!(v.check("sku_name", &json!("Standard_D2s_v3")).is_err());
        assert!(v.check("sku_name", &json!("GP_Gen5_2")).is_err());
    }

    #[test]
    fn test_virtual_network_rule_name() {
        let v = virtual_network_rule_name();
        assert!(v.check("name", &json!("a")).is_ok());
        assert!(v.check("name", &json!("rule_1")).is_ok());
        assert!(v.check("name", &json!("rule-")).is_err());
        assert!(v.check("name", &json!("_rule")).is_err());
    }

    #[test]
    fn test_storage_tiers_table() {
        let small = storage_tiers(32768).unwrap();
        assert_eq!(small.default, "P4");
        assert!(small.accepts("P50"));
        assert!(!small.accepts("P60"));

        let mid = storage_tiers(1048576).unwrap();
        assert_eq!(mid.default, "P30");
        assert_eq!(mid.valid, &["P30", "P40", "P50"]);

        assert_eq!(storage_tiers(4193280), storage_tiers(4194304));
        assert_eq!(storage_tiers(33553408).unwrap().valid, &["P80"]);
        assert!(storage_tiers(1000).is_none());

        for size in FLEXIBLE_STORAGE_MB {
            let tiers = storage_tiers(*size).unwrap();
            assert!(tiers.accepts(tiers.default));
            assert!(tiers.valid.iter().all(|t| STORAGE_TIERS.contains(t)));
        }
    }

    #[test]
    fn test_sku_rank() {
        assert!(single_server_sku_rank("GP_Gen5_4") > single_server_sku_rank("GP_Gen5_2"));
        assert_eq!(single_server_sku_rank("B_Gen4_1"), Some(0));
        assert_eq!(single_server_sku_rank("XX"), None);
    }
}
