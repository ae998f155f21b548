//! Text rendering of poll states for terminal output.

use std::fmt::Write as _;

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::poller::PollState;
use crate::types::SensorReading;

/// Language of user-visible text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "fr" => Ok(Self::Fr),
            other => Err(format!("unsupported language: {other} (expected en or fr)")),
        }
    }
}

impl Locale {
    #[must_use]
    pub fn loading(self) -> &'static str {
        match self {
            Self::En => "Loading sensor data...",
            Self::Fr => "Chargement des données...",
        }
    }

    #[must_use]
    pub fn load_failed(self) -> &'static str {
        match self {
            Self::En => "Failed to load sensor data",
            Self::Fr => "Erreur de chargement des données",
        }
    }

    #[must_use]
    pub fn auth_failed(self) -> &'static str {
        match self {
            Self::En => "Authentication error",
            Self::Fr => "Erreur d'authentification",
        }
    }

    #[must_use]
    pub fn authorization_required(self) -> &'static str {
        match self {
            Self::En => "Authorization required. Open this URL to grant access:",
            Self::Fr => "Autorisation requise. Ouvrez cette adresse pour autoriser l'accès :",
        }
    }

    #[must_use]
    pub fn retry_hint(self) -> &'static str {
        match self {
            Self::En => "Type r then Enter to refresh",
            Self::Fr => "Tapez r puis Entrée pour actualiser",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::En => "Indoor temperatures",
            Self::Fr => "Températures intérieures",
        }
    }

    fn temperature(self) -> &'static str {
        match self {
            Self::En => "Temperature",
            Self::Fr => "Température",
        }
    }

    fn humidity(self) -> &'static str {
        match self {
            Self::En => "Humidity",
            Self::Fr => "Humidité",
        }
    }

    fn last_update(self) -> &'static str {
        match self {
            Self::En => "Last update",
            Self::Fr => "Dernière mise à jour",
        }
    }

    fn no_sensors(self) -> &'static str {
        match self {
            Self::En => "No stations on this account",
            Self::Fr => "Aucune station sur ce compte",
        }
    }
}

/// Comfort band of an indoor temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureBand {
    Cold,
    Comfortable,
    Warm,
}

impl TemperatureBand {
    /// Below 18 °C is cold, above 24 °C is warm.
    #[must_use]
    pub fn classify(celsius: f64) -> Self {
        if celsius < 18.0 {
            Self::Cold
        } else if celsius > 24.0 {
            Self::Warm
        } else {
            Self::Comfortable
        }
    }

    fn marker(self) -> &'static str {
        match self {
            Self::Cold => "[cold]",
            Self::Comfortable => "[ok]",
            Self::Warm => "[warm]",
        }
    }
}

/// `HH:MM` of an epoch-millisecond timestamp at `offset`.
#[must_use]
pub fn format_last_update(epoch_ms: i64, offset: UtcOffset) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_ms) * 1_000_000)
        .ok()
        .and_then(|dt| {
            dt.to_offset(offset)
                .format(format_description!("[hour]:[minute]"))
                .ok()
        })
        .unwrap_or_else(|| "--:--".to_owned())
}

/// The local UTC offset, or UTC when it cannot be determined.
#[must_use]
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// One reading as a text card.
#[must_use]
pub fn render_card(reading: &SensorReading, locale: Locale, offset: UtcOffset) -> String {
    let band = TemperatureBand::classify(reading.temperature_celsius);
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", reading.name);
    let _ = writeln!(
        out,
        "  {:<12} {:>6.1} °C {}",
        locale.temperature(),
        reading.temperature_celsius,
        band.marker()
    );
    let _ = writeln!(
        out,
        "  {:<12} {:>6.0} %",
        locale.humidity(),
        reading.humidity_percent
    );
    let _ = writeln!(out, "  {:<12} {:>6} ppm", "CO2", reading.co2_ppm);
    let _ = writeln!(
        out,
        "  {} : {}",
        locale.last_update(),
        format_last_update(reading.last_update, offset)
    );
    out
}

/// Full-screen text for a poll state.
#[must_use]
pub fn render_state(state: &PollState, locale: Locale, offset: UtcOffset) -> String {
    match state {
        PollState::Loading => format!("{}\n", locale.loading()),
        PollState::Failed { message } => format!("{message}\n{}\n", locale.retry_hint()),
        PollState::AuthorizationRequired { url } => {
            format!("{}\n{url}\n", locale.authorization_required())
        }
        PollState::Ready(readings) => {
            let mut out = format!("{}\n\n", locale.title());
            if readings.is_empty() {
                let _ = writeln!(out, "{}", locale.no_sensors());
            }
            for reading in readings {
                out.push_str(&render_card(reading, locale, offset));
                out.push('\n');
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::offset;

    use super::*;
    use crate::types::DeviceId;

    fn salon() -> SensorReading {
        SensorReading {
            id: DeviceId::from("d1"),
            name: "Salon".into(),
            temperature_celsius: 21.5,
            humidity_percent: 40.0,
            co2_ppm: 600,
            last_update: 1_700_000_000_000,
        }
    }

    #[test]
    fn temperature_bands() {
        assert_eq!(TemperatureBand::classify(17.9), TemperatureBand::Cold);
        assert_eq!(TemperatureBand::classify(18.0), TemperatureBand::Comfortable);
        assert_eq!(TemperatureBand::classify(24.0), TemperatureBand::Comfortable);
        assert_eq!(TemperatureBand::classify(24.1), TemperatureBand::Warm);
    }

    #[test]
    fn last_update_formats_in_offset() {
        // 1_700_000_000 s = 2023-11-14T22:13:20Z
        assert_eq!(format_last_update(1_700_000_000_000, UtcOffset::UTC), "22:13");
        assert_eq!(format_last_update(1_700_000_000_000, offset!(+1)), "23:13");
    }

    #[test]
    fn last_update_out_of_range_is_placeholder() {
        assert_eq!(format_last_update(i64::MAX, UtcOffset::UTC), "--:--");
    }

    #[test]
    fn locale_parses() {
        assert_eq!("fr".parse::<Locale>().unwrap(), Locale::Fr);
        assert_eq!("EN".parse::<Locale>().unwrap(), Locale::En);
        assert!("de".parse::<Locale>().is_err());
    }

    #[test]
    fn card_contains_measurements() {
        let card = render_card(&salon(), Locale::En, UtcOffset::UTC);
        assert!(card.contains("Salon"));
        assert!(card.contains("21.5 °C [ok]"));
        assert!(card.contains("40 %"));
        assert!(card.contains("600 ppm"));
        assert!(card.contains("22:13"));
    }

    #[test]
    fn failed_state_shows_message_and_hint() {
        let text = render_state(
            &PollState::Failed {
                message: Locale::Fr.load_failed().into(),
            },
            Locale::Fr,
            UtcOffset::UTC,
        );
        assert!(text.contains("Erreur de chargement des données"));
        assert!(text.contains("actualiser"));
    }

    #[test]
    fn empty_ready_state_says_so() {
        let text = render_state(&PollState::Ready(vec![]), Locale::En, UtcOffset::UTC);
        assert!(text.contains("No stations"));
    }
}
