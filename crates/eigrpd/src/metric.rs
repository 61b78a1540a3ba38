//! The composite-metric formula (§4.D) and the hop-combination rules used both when a
//! neighbor's reported metric is combined with the receiving interface's link metrics, and when
//! pretty-printing a metric for logging (grounded on `eigrp_dump.c`'s metric printer, but driving
//! nothing but `Display` here — protocol logic never formats a metric to decide anything).

use eigrp_packet::tlv::KValues;
use std::fmt;

pub const METRIC_INFINITE: u32 = 0xFFFF_FFFF;
const BANDWIDTH_SCALE_NUMERATOR: u64 = 10_000_000;

/// The per-hop link contribution combined into a reported metric to get a neighbor-entry's local
/// distance (§4.D: "minimum-bandwidth, summed-delay rule").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinkMetric {
    pub bandwidth_kbps: u32,
    pub delay_10us: u32,
    pub reliability: u8,
    pub load: u8,
}

/// Combines a neighbor's reported link metric with the outgoing interface's own link metric,
/// applying the minimum-bandwidth / summed-delay rule before computing the composite distance.
pub fn combine(reported: LinkMetric, outgoing: LinkMetric) -> LinkMetric {
    LinkMetric {
        bandwidth_kbps: reported.bandwidth_kbps.min(outgoing.bandwidth_kbps),
        delay_10us: reported.delay_10us.saturating_add(outgoing.delay_10us),
        reliability: reported.reliability.min(outgoing.reliability),
        load: reported.load.max(outgoing.load),
    }
}

/// The composite-metric formula (§4.D):
/// `M = 256 * (K1*BW + K2*BW/(256-load) + K3*delay) * (K5/(reliability+K4) if K5 != 0 else 1)`
/// where `BW = 10^7 / min(bandwidth_of_each_hop)` and `delay` is the summed per-hop delay.
/// Saturates to [`METRIC_INFINITE`] on overflow or when either input is already infinite.
pub fn composite(k: KValues, link: LinkMetric) -> u32 {
    if link.bandwidth_kbps == 0 || link.delay_10us == METRIC_INFINITE || link.bandwidth_kbps == METRIC_INFINITE {
        return METRIC_INFINITE;
    }

    let bandwidth_scaled = BANDWIDTH_SCALE_NUMERATOR / (link.bandwidth_kbps as u64).max(1);

    let mut sum: u64 = (k.k1 as u64) * bandwidth_scaled;

    if k.k2 != 0 {
        let denom = 256u64.saturating_sub(link.load as u64).max(1);
        sum = sum.saturating_add((k.k2 as u64) * bandwidth_scaled / denom);
    }

    sum = sum.saturating_add((k.k3 as u64) * (link.delay_10us as u64));

    let mut metric = sum.saturating_mul(256);

    if k.k5 != 0 {
        let denom = (link.reliability as u64).saturating_add(k.k4 as u64).max(1);
        metric = metric.saturating_mul(k.k5 as u64) / denom;
    }

    if metric >= METRIC_INFINITE as u64 {
        METRIC_INFINITE
    } else {
        metric as u32
    }
}

pub fn is_infinite(metric: u32) -> bool {
    metric == METRIC_INFINITE
}

/// Formats a composite distance for log lines the way `eigrp_dump.c`'s metric printer does:
/// the raw value, with `infinite` spelled out rather than printed as a hex sentinel.
pub struct DisplayMetric(pub u32);

impl fmt::Display for DisplayMetric {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if is_infinite(self.0) {
            write!(formatter, "infinite")
        } else {
            write!(formatter, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(bandwidth_kbps: u32, delay_10us: u32) -> LinkMetric {
        LinkMetric { bandwidth_kbps, delay_10us, reliability: 255, load: 1 }
    }

    #[test]
    fn default_k_values_ignore_reliability_and_load() {
        let a = composite(KValues::DEFAULT, link(100_000, 100));
        let b = composite(KValues::DEFAULT, LinkMetric { reliability: 1, load: 255, ..link(100_000, 100) });
        assert_eq!(a, b);
    }

    #[test]
    fn higher_bandwidth_yields_lower_metric() {
        let fast = composite(KValues::DEFAULT, link(1_000_000, 100));
        let slow = composite(KValues::DEFAULT, link(100_000, 100));
        assert!(fast < slow);
    }

    #[test]
    fn combine_takes_minimum_bandwidth_and_sums_delay() {
        let combined = combine(link(100_000, 10), link(50_000, 20));
        assert_eq!(combined.bandwidth_kbps, 50_000);
        assert_eq!(combined.delay_10us, 30);
    }

    #[test]
    fn infinite_bandwidth_saturates() {
        let metric = composite(KValues::DEFAULT, LinkMetric { bandwidth_kbps: METRIC_INFINITE, ..link(0, 0) });
        assert!(is_infinite(metric));
    }

    #[test]
    fn zero_bandwidth_is_treated_as_infinite() {
        assert!(is_infinite(composite(KValues::DEFAULT, link(0, 10))));
    }
}
