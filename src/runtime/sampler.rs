//! Sampler descriptors from caller settings.
//!
//! Settings use WebGPU spellings (`linear`, `mirror-repeat`, `less-equal`);
//! matching is case-insensitive and unknown values fall back to the defaults.

use crate::options::SamplerSettings;

use super::backend::{AddressMode, CompareFunction, FilterMode, SamplerDesc};

fn normalized(value: Option<&str>) -> Option<String> {
    value.map(|v| v.trim().to_ascii_lowercase())
}

fn filter_mode(value: Option<&str>) -> FilterMode {
    match normalized(value).as_deref() {
        Some("nearest") => FilterMode::Nearest,
        _ => FilterMode::Linear,
    }
}

fn address_mode(value: Option<&str>) -> AddressMode {
    match normalized(value) {
        Some(v) if v.contains("mirror") => AddressMode::MirrorRepeat,
        Some(v) if v.contains("repeat") => AddressMode::Repeat,
        _ => AddressMode::ClampToEdge,
    }
}

fn compare_function(value: &str) -> Option<CompareFunction> {
    let f = match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "never" => CompareFunction::Never,
        "less" => CompareFunction::Less,
        "equal" => CompareFunction::Equal,
        "less-equal" => CompareFunction::LessEqual,
        "greater" => CompareFunction::Greater,
        "not-equal" => CompareFunction::NotEqual,
        "greater-equal" => CompareFunction::GreaterEqual,
        "always" => CompareFunction::Always,
        _ => return None,
    };
    Some(f)
}

/// Descriptor for a sampler binding. Comparison samplers default to `less`.
pub fn sampler_desc(settings: Option<&SamplerSettings>, comparison: bool) -> SamplerDesc {
    let default = SamplerSettings::default();
    let s = settings.unwrap_or(&default);
    let compare = match s.compare.as_deref() {
        Some(v) => {
            let f = compare_function(v);
            if f.is_none() {
                log::warn!("unknown sampler compare function `{v}`");
            }
            f
        }
        None => None,
    };
    SamplerDesc {
        mag_filter: filter_mode(s.mag_filter.as_deref()),
        min_filter: filter_mode(s.min_filter.as_deref()),
        mipmap_filter: filter_mode(s.mipmap_filter.as_deref()),
        address_modes: [
            address_mode(s.address_mode_u.as_deref()),
            address_mode(s.address_mode_v.as_deref()),
            address_mode(s.address_mode_w.as_deref()),
        ],
        compare: if comparison {
            compare.or(Some(CompareFunction::Less))
        } else {
            None
        },
    }
}
