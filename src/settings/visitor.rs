use serde::de::{Error, Visitor};

use super::MonitorSettings;

pub(crate) struct MonitorSettingsVisitor;

impl<'de> Visitor<'de> for MonitorSettingsVisitor {
    type Value = MonitorSettings;

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut tick_interval_ms = None;
        let mut sample_window_ms = None;
        let mut restart_delay_ms = None;
        let mut emergency_unlocks_per_week = None;

        while let Some(key) = map.next_key::<&str>()? {
            match key {
                "tick_interval_ms" => {
                    tick_interval_ms = Some(map.next_value::<u64>()?.clamp(250, 10_000))
                }
                "sample_window_ms" => {
                    sample_window_ms = Some(map.next_value::<u64>()?.clamp(1_000, 60_000))
                }
                "restart_delay_ms" => {
                    restart_delay_ms = Some(map.next_value::<u64>()?.clamp(100, 60_000))
                }
                "emergency_unlocks_per_week" => {
                    emergency_unlocks_per_week =
                        map.next_value::<Option<u32>>()?.map(|n| n.min(50))
                }
                &_ => {
                    let _: serde::de::IgnoredAny = map.next_value()?;
                }
            }
        }
        let tick_interval_ms =
            tick_interval_ms.ok_or_else(|| A::Error::missing_field("tick_interval_ms"))?;
        let sample_window_ms =
            sample_window_ms.ok_or_else(|| A::Error::missing_field("sample_window_ms"))?;
        let restart_delay_ms =
            restart_delay_ms.ok_or_else(|| A::Error::missing_field("restart_delay_ms"))?;

        Ok(MonitorSettings {
            tick_interval_ms,
            sample_window_ms,
            restart_delay_ms,
            emergency_unlocks_per_week,
        })
    }

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a map representing MonitorSettings")
    }
}
