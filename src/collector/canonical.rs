//! Counter name canonicalization.
//!
//! Raw sysfs counter names drift between kernel and OFED releases (case,
//! underscores, renamed aliases). This module maps every raw name onto a
//! stable "documented name" and carries the help text for the counters we
//! know about.
//!
//! Reference: "Understanding mlx5 Linux Counters and Status Parameters",
//! <https://enterprise-support.nvidia.com/s/article/understanding-mlx5-linux-counters-and-status-parameters>

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;

/// Documentation entry for a known counter.
#[derive(Debug, Clone, Copy)]
pub struct CounterSpec {
    pub doc_name: &'static str,
    pub help: &'static str,
}

/// Known raw names: (raw name, documented name, help).
///
/// Every documented name also appears as its own raw name so that
/// canonicalizing a documented name is a no-op.
const KNOWN_COUNTERS: &[(&str, &str, &str)] = &[
    (
        "port_rcv_data",
        "port_rcv_data",
        "The total number of data octets, divided by 4 (counting in double words, 32 bits), received on all VLs from the port.",
    ),
    (
        "port_rcv_packets",
        "port_rcv_packets",
        "Total number of packets (may include packets containing errors).",
    ),
    (
        "port_multicast_rcv_packets",
        "port_multicast_rcv_packets",
        "Total number of multicast packets, including multicast packets containing errors.",
    ),
    (
        "port_unicast_rcv_packets",
        "port_unicast_rcv_packets",
        "Total number of unicast packets, including unicast packets containing errors.",
    ),
    (
        "port_xmit_data",
        "port_xmit_data",
        "The total number of data octets, divided by 4, transmitted on all VLs from the port.",
    ),
    (
        "port_xmit_packets",
        "port_xmit_packets",
        "Total number of packets transmitted on all VLs from this port (may include packets with errors).",
    ),
    (
        "port_multicast_xmit_packets",
        "port_multicast_xmit_packets",
        "Total number of multicast packets transmitted on all VLs from the port (may include multicast packets with errors).",
    ),
    (
        "port_unicast_xmit_packets",
        "port_unicast_xmit_packets",
        "Total number of unicast packets transmitted on all VLs from the port (may include unicast packets with errors).",
    ),
    (
        "port_rcv_switch_relay_errors",
        "port_rcv_switch_relay_errors",
        "Total number of packets received on the port that were discarded because they could not be forwarded by the switch relay.",
    ),
    (
        "port_rcv_errors",
        "port_rcv_errors",
        "Total number of packets containing an error that were received on the port.",
    ),
    (
        "port_rcv_constraint_errors",
        "port_rcv_constraint_errors",
        "Total number of packets received on the switch physical port that are discarded.",
    ),
    (
        "local_link_integrity_errors",
        "local_link_integrity_errors",
        "Number of times that the count of local physical errors exceeded the threshold specified by LocalPhyErrors.",
    ),
    (
        "port_xmit_wait",
        "port_xmit_wait",
        "Number of ticks during which the port had data to transmit but no data was sent during the entire tick.",
    ),
    (
        "port_xmit_discards",
        "port_xmit_discards",
        "Total number of outbound packets discarded by the port because the port is down or congested.",
    ),
    (
        "port_xmit_constraint_errors",
        "port_xmit_constraint_errors",
        "Total number of packets not transmitted from the switch physical port.",
    ),
    (
        "port_rcv_remote_physical_errors",
        "port_rcv_remote_physical_errors",
        "Total number of packets marked with the EBP delimiter received on the port.",
    ),
    (
        "symbol_error",
        "symbol_error",
        "Total number of minor link errors detected on one or more physical lanes.",
    ),
    (
        "symbol_errors",
        "symbol_error",
        "Total number of minor link errors detected on one or more physical lanes.",
    ),
    (
        "VL15_dropped",
        "VL15_dropped",
        "Number of incoming VL15 packets dropped due to resource limitations.",
    ),
    (
        "VL15_Dropped",
        "VL15_dropped",
        "Number of incoming VL15 packets dropped due to resource limitations.",
    ),
    (
        "link_error_recovery",
        "link_error_recovery",
        "Total number of times the Port Training state machine successfully completed the link error recovery process.",
    ),
    (
        "link_downed",
        "link_downed",
        "Total number of times the Port Training state machine failed the link error recovery process and downed the link.",
    ),
    (
        "duplicate_request",
        "duplicate_request",
        "Number of received packets. A duplicate request is a request that had been previously executed.",
    ),
    (
        "implied_nak_seq_err",
        "implied_nak_seq_err",
        "Number of times the requester decided an ACK with a PSN larger than the expected PSN for an RDMA read or response.",
    ),
    (
        "lifespan",
        "lifespan",
        "The maximum period in ms which defines the aging of the counter reads. Two consecutive reads within this period might return the same values.",
    ),
    (
        "local_ack_timeout_err",
        "local_ack_timeout_err",
        "The number of times QP's ack timer expired for RC, XRC, DCT QPs at the sender side. The QP retry limit was not exceeded, therefore it is still a recoverable error.",
    ),
    (
        "np_cnp_sent",
        "np_cnp_sent",
        "The number of CNP packets sent by the Notification Point when it noticed congestion experienced in the RoCEv2 IP header (ECN bits). The counter was added in MLNX_OFED 4.1.",
    ),
    (
        "np_ecn_marked_roce_packets",
        "np_ecn_marked_roce_packets",
        "The number of RoCEv2 packets received by the notification point which were marked for experiencing congestion (ECN bits were '11' on the ingress RoCE traffic). The counter was added in MLNX_OFED 4.1.",
    ),
    (
        "out_of_buffer",
        "out_of_buffer",
        "The number of drops that occurred due to lack of WQE for the associated QPs.",
    ),
    (
        "out_of_sequence",
        "out_of_sequence",
        "The number of out-of-sequence packets received.",
    ),
    (
        "packet_seq_err",
        "packet_seq_err",
        "The number of received NAK sequence error packets. The QP retry limit was not exceeded.",
    ),
    (
        "req_cqe_error",
        "req_cqe_error",
        "The number of times requester detected CQEs completed with errors. Added in MLNX_OFED 4.1.",
    ),
    (
        "req_cqe_flush_error",
        "req_cqe_flush_error",
        "The number of times requester detected CQEs completed with flushed errors. Added in MLNX_OFED 4.1.",
    ),
    (
        "req_remote_access_errors",
        "req_remote_access_errors",
        "The number of times requester detected remote access errors. Added in MLNX_OFED 4.1.",
    ),
    (
        "req_remote_invalid_request",
        "req_remote_invalid_request",
        "The number of times requester detected remote invalid request errors. Added in MLNX_OFED 4.1.",
    ),
    (
        "resp_cqe_error",
        "resp_cqe_error",
        "The number of times responder detected CQEs completed with errors. Added in MLNX_OFED 4.1.",
    ),
    (
        "resp_cqe_flush_error",
        "resp_cqe_flush_error",
        "The number of times responder detected CQEs completed with flushed errors. Added in MLNX_OFED 4.1.",
    ),
    (
        "resp_local_length_error",
        "resp_local_length_error",
        "The number of times responder detected local length errors. Added in MLNX_OFED 4.1.",
    ),
    (
        "resp_remote_access_errors",
        "resp_remote_access_errors",
        "The number of times responder detected remote access errors. Added in MLNX_OFED 4.1.",
    ),
    (
        "rnr_nak_retry_err",
        "rnr_nak_retry_err",
        "The number of received RNR NAK packets. The QP retry limit was not exceeded.",
    ),
    (
        "roce_adp_retrans",
        "roce_adp_retrans",
        "Counts the number of adaptive retransmissions for RoCE traffic. Added in MLNX_OFED rev 5.0-1.0.0.0 and kernel v5.6.0.",
    ),
    (
        "roce_adp_retrans_to",
        "roce_adp_retrans_to",
        "Counts the number of times RoCE traffic reached timeout due to adaptive retransmission. Added in MLNX_OFED rev 5.0-1.0.0.0 and kernel v5.6.0.",
    ),
    (
        "roce_slow_restart",
        "roce_slow_restart",
        "Counts the number of times RoCE slow restart was used. Added in MLNX_OFED rev 5.0-1.0.0.0 and kernel v5.6.0.",
    ),
    (
        "roce_slow_restart_cnps",
        "roce_slow_restart_cnps",
        "Counts the number of times RoCE slow restart generated CNP packets. Added in MLNX_OFED rev 5.0-1.0.0.0 and kernel v5.6.0.",
    ),
    (
        "roce_slow_restart_trans",
        "roce_slow_restart_trans",
        "Counts the number of times RoCE slow restart changed state to slow restart. Added in MLNX_OFED rev 5.0-1.0.0.0 and kernel v5.6.0.",
    ),
    (
        "rp_cnp_handled",
        "rp_cnp_handled",
        "The number of CNP packets handled by the Reaction Point HCA to throttle the transmission rate. Added in MLNX_OFED 4.1.",
    ),
    (
        "rp_cnp_ignored",
        "rp_cnp_ignored",
        "The number of CNP packets received and ignored by the Reaction Point HCA. This counter should not raise if RoCE Congestion Control was enabled in the network. If this counter rises, verify that ECN was enabled on the adapter. Added in MLNX_OFED 4.1.",
    ),
    (
        "rx_atomic_requests",
        "rx_atomic_requests",
        "The number of received ATOMIC requests for the associated QPs.",
    ),
    (
        "rx_dct_connect",
        "rx_dct_connect",
        "The number of received connection requests for the associated DCTs.",
    ),
    (
        "rx_icrc_encapsulated",
        "rx_icrc_encapsulated",
        "The number of RoCE packets with ICRC errors. This counter was added in MLNX_OFED 4.4 and kernel 4.19.",
    ),
    (
        "rx_read_requests",
        "rx_read_requests",
        "The number of received READ requests for the associated QPs.",
    ),
    (
        "rx_write_requests",
        "rx_write_requests",
        "The number of received WRITE requests for the associated QPs.",
    ),
];

/// Lookup table from raw name to counter documentation.
static COUNTER_SPECS: Lazy<HashMap<&'static str, CounterSpec>> = Lazy::new(|| {
    KNOWN_COUNTERS
        .iter()
        .map(|&(raw, doc_name, help)| (raw, CounterSpec { doc_name, help }))
        .collect()
});

/// Help text keyed by documented name.
static HELP_BY_DOC_NAME: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    KNOWN_COUNTERS
        .iter()
        .filter(|(_, doc_name, help)| !doc_name.is_empty() && !help.is_empty())
        .map(|&(_, doc_name, help)| (doc_name, help))
        .collect()
});

/// Looks up the documentation entry for an exact raw name.
pub fn counter_spec(raw_name: &str) -> Option<&'static CounterSpec> {
    COUNTER_SPECS.get(raw_name)
}

/// Returns the documented name for a raw counter name.
///
/// Exact table hits win; otherwise the sanitized form is looked up again and,
/// failing that, used verbatim. The result is never empty.
pub fn canonical_doc_name(raw_name: &str) -> String {
    if let Some(spec) = counter_spec(raw_name) {
        return spec.doc_name.to_string();
    }
    let sanitized = sanitize_stat_name(raw_name);
    if let Some(spec) = counter_spec(&sanitized) {
        return spec.doc_name.to_string();
    }
    sanitized
}

/// Help text for a documented name, or `fallback` for unknown counters.
pub fn doc_help<'a>(doc_name: &str, fallback: &'a str) -> &'a str {
    match HELP_BY_DOC_NAME.get(doc_name) {
        Some(help) => help,
        None => fallback,
    }
}

/// Reduces an arbitrary string to `[a-z0-9_]`, suitable for a metric name
/// segment.
///
/// ASCII upper case is lowered, a leading digit gets a `_` prefix and any
/// other character (including all non-ASCII) becomes `_`. Input that is
/// empty or contains no valid character at all yields `unknown`.
pub fn sanitize_stat_name(stat: &str) -> String {
    let mut out = String::with_capacity(stat.len() + 1);
    let mut any_valid = false;

    for (i, c) in stat.chars().enumerate() {
        match c {
            'a'..='z' | '_' => {
                any_valid = true;
                out.push(c);
            }
            'A'..='Z' => {
                any_valid = true;
                out.push(c.to_ascii_lowercase());
            }
            '0'..='9' => {
                any_valid = true;
                if i == 0 {
                    out.push('_');
                }
                out.push(c);
            }
            _ => out.push('_'),
        }
    }

    if !any_valid {
        return "unknown".to_string();
    }
    out
}
