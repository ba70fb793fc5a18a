use spotfleet_common::{Architecture, ImagePreference, VmSize};
use spotfleet_providers::{CloudProvider, ImageReference};

pub const PUBLISHER: &str = "Canonical";
pub const VERSION: &str = "latest";

const NON_LTS_OFFERS: [&str; 2] = ["ubuntu-25_04", "ubuntu-24_10"];
const LTS_OFFER: &str = "ubuntu-24_04-lts";
const JAMMY_MINIMAL_OFFER: &str = "0001-com-ubuntu-minimal-jammy";
const JAMMY_SERVER_OFFER: &str = "0001-com-ubuntu-server-jammy";

/// Hardcoded (offer, sku) known to exist historically in every public region.
pub fn last_resort(arch: Architecture) -> (&'static str, &'static str) {
    match arch {
        Architecture::X64 => (JAMMY_SERVER_OFFER, "22_04-lts-gen2"),
        Architecture::Arm64 => (JAMMY_SERVER_OFFER, "22_04-lts-arm64"),
    }
}

/// Ordered (offer, preferred SKUs) pairs to probe.
pub fn candidates(arch: Architecture, pref: &ImagePreference) -> Vec<(&'static str, Vec<&'static str>)> {
    let arm = arch == Architecture::Arm64;
    let ordered = |minimal: &'static str, full: &'static str| -> Vec<&'static str> {
        if pref.prefer_full_image {
            vec![full, minimal]
        } else {
            vec![minimal, full]
        }
    };

    let modern = if arm {
        ordered("minimal-arm64", "server-arm64")
    } else {
        ordered("minimal", "server")
    };

    let mut non_lts: Vec<(&'static str, Vec<&'static str>)> = NON_LTS_OFFERS
        .iter()
        .map(|offer| (*offer, modern.clone()))
        .collect();

    let mut lts: Vec<(&'static str, Vec<&'static str>)> = vec![(LTS_OFFER, modern.clone())];
    let (jammy_minimal, jammy_server) = if arm {
        ("minimal-22_04-lts-arm64", "22_04-lts-arm64")
    } else {
        ("minimal-22_04-lts-gen2", "22_04-lts-gen2")
    };
    // Jammy ships minimal and full images under separate offers.
    if pref.prefer_full_image {
        lts.push((JAMMY_SERVER_OFFER, vec![jammy_server]));
        lts.push((JAMMY_MINIMAL_OFFER, vec![jammy_minimal]));
    } else {
        lts.push((JAMMY_MINIMAL_OFFER, vec![jammy_minimal]));
        lts.push((JAMMY_SERVER_OFFER, vec![jammy_server]));
    }

    if pref.prefer_lts {
        lts.append(&mut non_lts);
        lts
    } else {
        non_lts.append(&mut lts);
        non_lts
    }
}

fn reference(offer: &str, sku: &str) -> ImageReference {
    ImageReference {
        publisher: PUBLISHER.to_string(),
        offer: offer.to_string(),
        sku: sku.to_string(),
        version: VERSION.to_string(),
    }
}

/// Pick an image for `size`. Always returns a reference; a missing image only
/// surfaces later, from the instance create call.
pub async fn resolve(
    provider: &dyn CloudProvider,
    location: &str,
    size: &str,
    pref: &ImagePreference,
) -> ImageReference {
    let arch = VmSize::parse(size).arch;

    for (offer, wanted) in candidates(arch, pref) {
        let available = match provider.list_image_skus(location, PUBLISHER, offer).await {
            Ok(skus) => skus,
            Err(e) => {
                tracing::debug!("[image] Catalog lookup for {} failed: {}", offer, e);
                continue;
            }
        };
        if let Some(sku) = wanted
            .iter()
            .find(|w| available.iter().any(|a| a.eq_ignore_ascii_case(w)))
        {
            tracing::info!("✅ [image] Selected {}:{}:{} for {}", PUBLISHER, offer, sku, size);
            return reference(offer, sku);
        }
    }

    let (offer, sku) = last_resort(arch);
    tracing::warn!(
        "⚠️ [image] No preferred image found in {}; falling back to {}:{}",
        location,
        offer,
        sku
    );
    reference(offer, sku)
}
