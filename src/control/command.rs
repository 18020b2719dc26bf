use crate::wire::AlgoResult;

/// Where a control command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandSource {
    /// Result received on this tick.
    Fresh,
    /// No result this tick; reused the most recent one.
    LastKnownGood,
    /// No result ever received.
    #[default]
    SafeZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Command {
    pub value: f64,
    pub source: CommandSource,
    /// Sensor sequence the underlying result was computed from.
    pub sensor_seq: Option<u64>,
    pub algo_latency_ms: Option<f64>,
}

/// Last-known-good fallback: fresh result, else the previous one, else zero.
#[derive(Debug, Default)]
pub(crate) struct CommandSelector {
    last_good: Option<AlgoResult>,
}

impl CommandSelector {
    pub(crate) fn select(&mut self, fresh: Option<AlgoResult>) -> Command {
        let source = match fresh {
            Some(result) => {
                self.last_good = Some(result);
                CommandSource::Fresh
            }
            None if self.last_good.is_some() => CommandSource::LastKnownGood,
            None => CommandSource::SafeZero,
        };

        match self.last_good {
            Some(r) => Command {
                value: r.out_value,
                source,
                sensor_seq: Some(r.sensor_seq),
                algo_latency_ms: Some(r.latency_ms),
            },
            None => Command::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(v: f64) -> AlgoResult {
        AlgoResult {
            sensor_seq: 1,
            produced_ts_ns: 0,
            out_value: v,
            latency_ms: 2.0,
        }
    }

    #[test]
    fn zero_until_first_result() {
        let mut sel = CommandSelector::default();
        let cmd = sel.select(None);
        assert_eq!(cmd.value, 0.0);
        assert_eq!(cmd.source, CommandSource::SafeZero);
    }

    #[test]
    fn pins_last_value_when_results_stop() {
        let mut sel = CommandSelector::default();
        assert_eq!(sel.select(Some(result(0.7))).source, CommandSource::Fresh);
        for _ in 0..100 {
            let cmd = sel.select(None);
            assert_eq!(cmd.value, 0.7);
            assert_eq!(cmd.source, CommandSource::LastKnownGood);
        }
        assert_eq!(sel.select(Some(result(-0.1))).value, -0.1);
    }
}
