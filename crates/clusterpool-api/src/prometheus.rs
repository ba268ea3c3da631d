//! Prometheus text exposition format.
//!
//! Renders a pool snapshot into gauges for scraping by a Prometheus server
//! or compatible agent.

use clusterpool_state::{PoolStatus, ResourceStatus};

/// Render a pool snapshot into Prometheus text format.
///
/// `clusterpool_clusters` carries one series per status; `clusterpool_cluster_status`
/// is a one-hot gauge per cluster.
pub fn render_prometheus(status: &PoolStatus) -> String {
    let mut out = String::new();

    out.push_str("# HELP clusterpool_clusters_total Fixed number of pooled clusters.\n");
    out.push_str("# TYPE clusterpool_clusters_total gauge\n");
    out.push_str(&format!("clusterpool_clusters_total {}\n", status.total));

    out.push_str("# HELP clusterpool_clusters Clusters per lifecycle status.\n");
    out.push_str("# TYPE clusterpool_clusters gauge\n");
    for s in ResourceStatus::ALL {
        out.push_str(&format!(
            "clusterpool_clusters{{status=\"{}\"}} {}\n",
            s,
            status.count(s)
        ));
    }

    out.push_str("# HELP clusterpool_cluster_status Current status of each cluster (1 = in status).\n");
    out.push_str("# TYPE clusterpool_cluster_status gauge\n");
    for (id, current) in &status.resources {
        for s in ResourceStatus::ALL {
            out.push_str(&format!(
                "clusterpool_cluster_status{{cluster=\"{}\",status=\"{}\"}} {}\n",
                id,
                s,
                u8::from(*current == s)
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn test_status() -> PoolStatus {
        let mut resources = BTreeMap::new();
        resources.insert("cluster-1".to_string(), ResourceStatus::Locked);
        resources.insert("cluster-2".to_string(), ResourceStatus::Available);
        PoolStatus {
            total: 2,
            available: 1,
            locked: 1,
            resources,
            ..PoolStatus::default()
        }
    }

    #[test]
    fn renders_counts_per_status() {
        let body = render_prometheus(&test_status());
        assert!(body.contains("clusterpool_clusters_total 2\n"));
        assert!(body.contains("clusterpool_clusters{status=\"available\"} 1\n"));
        assert!(body.contains("clusterpool_clusters{status=\"locked\"} 1\n"));
        assert!(body.contains("clusterpool_clusters{status=\"error\"} 0\n"));
    }

    #[test]
    fn renders_one_hot_cluster_status() {
        let body = render_prometheus(&test_status());
        assert!(body.contains("clusterpool_cluster_status{cluster=\"cluster-1\",status=\"locked\"} 1\n"));
        assert!(body.contains("clusterpool_cluster_status{cluster=\"cluster-1\",status=\"available\"} 0\n"));
        assert!(body.contains("clusterpool_cluster_status{cluster=\"cluster-2\",status=\"available\"} 1\n"));
    }

    #[test]
    fn empty_snapshot_still_has_headers() {
        let body = render_prometheus(&PoolStatus::default());
        assert!(body.contains("# TYPE clusterpool_clusters gauge"));
        assert!(body.contains("clusterpool_clusters_total 0\n"));
    }
}
