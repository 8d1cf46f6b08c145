//! Centralized Prometheus metric names. Every `metrics::counter!`/`gauge!`
//! call elsewhere in the workspace references one of these constants rather
//! than an inline string literal, and [`describe_all`] registers HELP text
//! for all of them once at daemon boot.

pub const PACKETS_INGESTED_TOTAL: &str = "netsentry_packets_ingested_total";
pub const PACKETS_DROPPED_TOTAL: &str = "netsentry_packets_dropped_total";
pub const PACKETS_CLASSIFY_FAILED_TOTAL: &str = "netsentry_packets_classify_failed_total";

pub const THREATS_EMITTED_TOTAL: &str = "netsentry_threats_emitted_total";
pub const THREATS_OPEN: &str = "netsentry_threats_open";
pub const THREATS_IDLED_OUT_TOTAL: &str = "netsentry_threats_idled_out_total";

pub const ACTIVE_BLOCKS: &str = "netsentry_active_blocks";
pub const BLOCKS_INSTALLED_TOTAL: &str = "netsentry_blocks_installed_total";
pub const BLOCKS_REMOVED_TOTAL: &str = "netsentry_blocks_removed_total";
pub const BLOCKS_EXTENDED_TOTAL: &str = "netsentry_blocks_extended_total";
pub const DRIVER_ERRORS_TOTAL: &str = "netsentry_driver_errors_total";
pub const MITIGATION_WHITELIST_SUPPRESSED_TOTAL: &str =
    "netsentry_mitigation_whitelist_suppressed_total";

pub const SKETCH_RESETS_TOTAL: &str = "netsentry_sketch_resets_total";
pub const ARP_TABLE_READS_TOTAL: &str = "netsentry_arp_table_reads_total";
pub const ARP_TABLE_READ_ERRORS_TOTAL: &str = "netsentry_arp_table_read_errors_total";

pub const DETECTION_TICK_DURATION_SECONDS: &str = "netsentry_detection_tick_duration_seconds";

/// `kind` label values used on several of the counters above.
pub const LABEL_KIND: &str = "kind";
/// `detector` label values used on `DETECTION_TICK_DURATION_SECONDS`.
pub const LABEL_DETECTOR: &str = "detector";

pub const TICK_DURATION_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Registers HELP text for every metric above. Call exactly once, before
/// the Prometheus exporter starts serving `/metrics`.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(PACKETS_INGESTED_TOTAL, "Classified packet events emitted by the packet source");
    describe_counter!(PACKETS_DROPPED_TOTAL, "Events dropped at the capture-to-router channel boundary");
    describe_counter!(PACKETS_CLASSIFY_FAILED_TOTAL, "Frames discarded at classification (malformed header)");

    describe_counter!(THREATS_EMITTED_TOTAL, "Threat records emitted by detectors");
    describe_gauge!(THREATS_OPEN, "Threats currently open in the registry");
    describe_counter!(THREATS_IDLED_OUT_TOTAL, "Threats removed from the registry after idling out");

    describe_gauge!(ACTIVE_BLOCKS, "Active blocks currently tracked by the mitigation controller");
    describe_counter!(BLOCKS_INSTALLED_TOTAL, "Blocks installed via the packet-filter driver");
    describe_counter!(BLOCKS_REMOVED_TOTAL, "Blocks removed by the expiry sweeper");
    describe_counter!(BLOCKS_EXTENDED_TOTAL, "Existing blocks whose expiry was extended instead of reinstalled");
    describe_counter!(DRIVER_ERRORS_TOTAL, "Packet-filter driver command failures");
    describe_counter!(
        MITIGATION_WHITELIST_SUPPRESSED_TOTAL,
        "Threats suppressed by the whitelist without calling the driver"
    );

    describe_counter!(SKETCH_RESETS_TOTAL, "Count-Min Sketch reset cycles");
    describe_counter!(ARP_TABLE_READS_TOTAL, "Neighbor table reads performed by the ARP detector");
    describe_counter!(ARP_TABLE_READ_ERRORS_TOTAL, "Neighbor table reads that failed");

    describe_histogram!(DETECTION_TICK_DURATION_SECONDS, "Wall time spent in one detector's detection tick");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_metric_names_start_with_prefix() {
        let names = [
            PACKETS_INGESTED_TOTAL,
            PACKETS_DROPPED_TOTAL,
            PACKETS_CLASSIFY_FAILED_TOTAL,
            THREATS_EMITTED_TOTAL,
            THREATS_OPEN,
            THREATS_IDLED_OUT_TOTAL,
            ACTIVE_BLOCKS,
            BLOCKS_INSTALLED_TOTAL,
            BLOCKS_REMOVED_TOTAL,
            BLOCKS_EXTENDED_TOTAL,
            DRIVER_ERRORS_TOTAL,
            MITIGATION_WHITELIST_SUPPRESSED_TOTAL,
            SKETCH_RESETS_TOTAL,
            ARP_TABLE_READS_TOTAL,
            ARP_TABLE_READ_ERRORS_TOTAL,
            DETECTION_TICK_DURATION_SECONDS,
        ];
        for name in names {
            assert!(name.starts_with("netsentry_"), "{name} missing prefix");
        }
    }

    #[test]
    fn tick_duration_buckets_are_sorted() {
        assert!(TICK_DURATION_BUCKETS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }
}
