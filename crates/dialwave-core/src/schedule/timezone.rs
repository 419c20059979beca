//! Effective timezone resolution

use chrono_tz::Tz;
use dialwave_storage::models::Campaign;
use tracing::warn;

/// IANA areas whose `Area/Location` names are canonical zones.
/// Most backward-compatibility links (`US/Eastern`, `Etc/GMT+5`) live outside
/// these areas; the rest are listed in `BACKWARD_LINKS`.
const CANONICAL_AREAS: &[&str] = &[
    "Africa",
    "America",
    "Antarctica",
    "Arctic",
    "Asia",
    "Atlantic",
    "Australia",
    "Europe",
    "Indian",
    "Pacific",
];

/// Renamed or merged zones kept by the IANA `backward` file inside the
/// canonical areas. chrono-tz parses them, so they are refused by name.
const BACKWARD_LINKS: &[&str] = &[
    "Africa/Asmera",
    "Africa/Timbuktu",
    "America/Argentina/ComodRivadavia",
    "America/Atka",
    "America/Buenos_Aires",
    "America/Catamarca",
    "America/Coral_Harbour",
    "America/Cordoba",
    "America/Ensenada",
    "America/Fort_Wayne",
    "America/Godthab",
    "America/Indianapolis",
    "America/Jujuy",
    "America/Knox_IN",
    "America/Louisville",
    "America/Mendoza",
    "America/Montreal",
    "America/Nipigon",
    "America/Pangnirtung",
    "America/Porto_Acre",
    "America/Rainy_River",
    "America/Rosario",
    "America/Santa_Isabel",
    "America/Shiprock",
    "America/Thunder_Bay",
    "America/Virgin",
    "America/Yellowknife",
    "Antarctica/South_Pole",
    "Asia/Ashkhabad",
    "Asia/Calcutta",
    "Asia/Chongqing",
    "Asia/Chungking",
    "Asia/Dacca",
    "Asia/Harbin",
    "Asia/Istanbul",
    "Asia/Kashgar",
    "Asia/Katmandu",
    "Asia/Macao",
    "Asia/Rangoon",
    "Asia/Saigon",
    "Asia/Tel_Aviv",
    "Asia/Thimbu",
    "Asia/Ujung_Pandang",
    "Asia/Ulan_Bator",
    "Atlantic/Faeroe",
    "Atlantic/Jan_Mayen",
    "Australia/ACT",
    "Australia/Canberra",
    "Australia/Currie",
    "Australia/LHI",
    "Australia/NSW",
    "Australia/North",
    "Australia/Queensland",
    "Australia/South",
    "Australia/Tasmania",
    "Australia/Victoria",
    "Australia/West",
    "Australia/Yancowinna",
    "Europe/Belfast",
    "Europe/Kiev",
    "Europe/Nicosia",
    "Europe/Tiraspol",
    "Europe/Uzhgorod",
    "Europe/Zaporozhye",
    "Pacific/Enderbury",
    "Pacific/Johnston",
    "Pacific/Ponape",
    "Pacific/Samoa",
    "Pacific/Truk",
    "Pacific/Yap",
];

/// Whether `id` is a canonical IANA zone name (or `UTC`)
pub fn is_valid_timezone(id: &str) -> bool {
    if id == "UTC" {
        return true;
    }

    let Some((area, location)) = id.split_once('/') else {
        return false;
    };
    if !CANONICAL_AREAS.contains(&area) || location.is_empty() {
        return false;
    }
    if BACKWARD_LINKS.contains(&id) {
        return false;
    }

    id.parse::<Tz>().is_ok()
}

fn parse_valid(id: Option<&str>) -> Option<Tz> {
    let id = id?.trim();
    if !is_valid_timezone(id) {
        return None;
    }
    id.parse::<Tz>().ok()
}

/// Zone used to evaluate a campaign's window and date bounds
///
/// The campaign's own zone when `use_custom_timezone` is set and valid, else
/// the tenant's zone when valid, else UTC.
pub fn effective_timezone(campaign: &Campaign, tenant_timezone: Option<&str>) -> Tz {
    if campaign.use_custom_timezone {
        match parse_valid(campaign.timezone.as_deref()) {
            Some(tz) => return tz,
            None => warn!(
                campaign_id = %campaign.id,
                timezone = ?campaign.timezone,
                "Campaign timezone is not a valid IANA zone, falling back"
            ),
        }
    }

    if let Some(tz) = parse_valid(tenant_timezone) {
        return tz;
    }
    if tenant_timezone.is_some() {
        warn!(
            campaign_id = %campaign.id,
            timezone = ?tenant_timezone,
            "Tenant timezone is not a valid IANA zone, using UTC"
        );
    }

    Tz::UTC
}
