//! Query string construction for the report and search endpoints.
//!
//! Each options struct maps its fields onto the exact parameter names the
//! EveBox server reads. Parameters are emitted in a fixed order and empty
//! fields are left out.

use serde::{Deserialize, Serialize};

/// Ordered, multi-valued list of query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value; repeated keys are kept.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.push((key.into(), value.into()));
        self
    }

    /// Append only when the value is present and non-empty.
    pub fn append_opt(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.append(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Time ranges are sent in seconds with an explicit unit suffix.
fn seconds(value: u64) -> String {
    format!("{}s", value)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportHistogramOptions {
    /// Seconds; ignored when zero.
    pub time_range: Option<u64>,
    pub interval: Option<String>,
    pub address_filter: Option<String>,
    pub query_string: Option<String>,
    pub sensor_filter: Option<String>,
    pub event_type: Option<String>,
    pub dns_type: Option<String>,
}

impl ReportHistogramOptions {
    pub fn to_query(&self) -> QueryParams {
        let mut query = QueryParams::new();
        if let Some(range) = self.time_range.filter(|r| *r > 0) {
            query.append("time_range", seconds(range));
        }
        query
            .append_opt("interval", self.interval.as_deref())
            .append_opt("address_filter", self.address_filter.as_deref())
            .append_opt("query_string", self.query_string.as_deref())
            .append_opt("sensor_name", self.sensor_filter.as_deref())
            .append_opt("dns_type", self.dns_type.as_deref())
            .append_opt("event_type", self.event_type.as_deref());
        query
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportAggOptions {
    pub size: Option<u64>,
    pub query_string: Option<String>,
    /// Seconds.
    pub time_range: Option<u64>,
    pub event_type: Option<String>,
    pub dns_type: Option<String>,
}

impl ReportAggOptions {
    pub fn to_query(&self, agg: &str) -> QueryParams {
        let mut query = QueryParams::new();
        query.append("agg", agg);
        if let Some(size) = self.size {
            query.append("size", size.to_string());
        }
        if let Some(ref query_string) = self.query_string {
            query.append("query_string", query_string.as_str());
        }
        if let Some(range) = self.time_range {
            query.append("time_range", seconds(range));
        }
        if let Some(ref event_type) = self.event_type {
            query.append("event_type", event_type.as_str());
        }
        // The server reads this one under its camelCase name.
        if let Some(ref dns_type) = self.dns_type {
            query.append("dnsType", dns_type.as_str());
        }
        query
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQueryOptions {
    pub query_string: Option<String>,
    pub max_ts: Option<String>,
    pub min_ts: Option<String>,
    /// `"all"` is the same as no filter.
    pub event_type: Option<String>,
    pub sort_order: Option<String>,
    pub sort_by: Option<String>,
    pub size: Option<u64>,
    /// Seconds; ignored when zero.
    pub time_range: Option<u64>,
}

impl EventQueryOptions {
    pub fn to_query(&self) -> QueryParams {
        let mut query = QueryParams::new();
        query
            .append_opt("query_string", self.query_string.as_deref())
            .append_opt("max_ts", self.max_ts.as_deref())
            .append_opt("min_ts", self.min_ts.as_deref())
            .append_opt(
                "event_type",
                self.event_type.as_deref().filter(|t| *t != "all"),
            )
            .append_opt("order", self.sort_order.as_deref())
            .append_opt("sort_by", self.sort_by.as_deref());
        if let Some(size) = self.size.filter(|s| *s > 0) {
            query.append("size", size.to_string());
        }
        if let Some(range) = self.time_range.filter(|r| *r > 0) {
            query.append("time_range", seconds(range));
        }
        query
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowHistogramOptions {
    /// Add an `app_proto` sub-aggregation.
    pub app_proto: bool,
    /// Passed through as-is, e.g. `"3600s"`.
    pub time_range: Option<String>,
    pub query_string: Option<String>,
    pub interval: Option<String>,
}

impl FlowHistogramOptions {
    pub fn to_query(&self) -> QueryParams {
        let mut sub_aggs = Vec::new();
        if self.app_proto {
            sub_aggs.push("app_proto");
        }

        let mut query = QueryParams::new();
        if !sub_aggs.is_empty() {
            query.append("sub_aggs", sub_aggs.join(","));
        }
        query
            .append_opt("time_range", self.time_range.as_deref())
            .append_opt("query_string", self.query_string.as_deref())
            .append_opt("interval", self.interval.as_deref());
        query
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertQueryOptions {
    pub query_string: Option<String>,
    pub must_have_tags: Vec<String>,
    pub must_not_have_tags: Vec<String>,
    /// Passed through as-is, e.g. `"86400s"`.
    pub time_range: Option<String>,
}

impl AlertQueryOptions {
    pub fn to_query(&self) -> QueryParams {
        let tags: Vec<String> = self
            .must_have_tags
            .iter()
            .cloned()
            .chain(self.must_not_have_tags.iter().map(|t| format!("-{}", t)))
            .collect();

        let mut query = QueryParams::new();
        // Always sent, even when empty.
        query.append("tags", tags.join(","));
        if let Some(ref time_range) = self.time_range {
            query.append("time_range", time_range.as_str());
        }
        if let Some(ref query_string) = self.query_string {
            query.append("query_string", query_string.as_str());
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_multi_valued() {
        let mut query = QueryParams::new();
        query.append("tag", "a").append("tag", "b").append("x", "1");
        assert_eq!(query.get("tag"), Some("a"));
        assert_eq!(query.get_all("tag"), vec!["a", "b"]);
        assert_eq!(query.len(), 3);
        assert_eq!(query.get("missing"), None);
    }

    #[test]
    fn test_append_opt_skips_empty() {
        let mut query = QueryParams::new();
        query.append_opt("a", None).append_opt("b", Some("")).append_opt("c", Some("v"));
        assert_eq!(query.pairs(), &[("c".to_string(), "v".to_string())]);
    }

    #[test]
    fn test_report_histogram_mapping() {
        let options = ReportHistogramOptions {
            time_range: Some(86400),
            interval: Some("1h".into()),
            address_filter: Some("10.0.0.1".into()),
            query_string: Some("alert.severity:1".into()),
            sensor_filter: Some("sensor-a".into()),
            event_type: Some("dns".into()),
            dns_type: Some("answer".into()),
        };
        let query = options.to_query();
        let expected: QueryParams = vec![
            ("time_range", "86400s"),
            ("interval", "1h"),
            ("address_filter", "10.0.0.1"),
            ("query_string", "alert.severity:1"),
            ("sensor_name", "sensor-a"),
            ("dns_type", "answer"),
            ("event_type", "dns"),
        ]
        .into_iter()
        .collect();
        assert_eq!(query, expected);
    }

    #[test]
    fn test_report_histogram_zero_time_range_omitted() {
        let options = ReportHistogramOptions {
            time_range: Some(0),
            ..Default::default()
        };
        assert!(options.to_query().is_empty());
    }

    #[test]
    fn test_report_agg_mapping() {
        let options = ReportAggOptions {
            size: Some(10),
            query_string: Some("dns".into()),
            time_range: Some(3600),
            event_type: Some("dns".into()),
            dns_type: Some("query".into()),
        };
        let query = options.to_query("dns.rrname");
        assert_eq!(query.pairs()[0], ("agg".to_string(), "dns.rrname".to_string()));
        assert_eq!(query.get("size"), Some("10"));
        assert_eq!(query.get("query_string"), Some("dns"));
        assert_eq!(query.get("time_range"), Some("3600s"));
        assert_eq!(query.get("event_type"), Some("dns"));
        assert_eq!(query.get("dnsType"), Some("query"));
        assert_eq!(query.get("dns_type"), None);
    }

    #[test]
    fn test_report_agg_zero_time_range_still_sent() {
        let options = ReportAggOptions {
            time_range: Some(0),
            ..Default::default()
        };
        assert_eq!(options.to_query("src_ip").get("time_range"), Some("0s"));
    }

    #[test]
    fn test_event_query_mapping() {
        let options = EventQueryOptions {
            query_string: Some("src_ip:10.1.1.1".into()),
            max_ts: Some("2020-01-02T00:00:00Z".into()),
            min_ts: Some("2020-01-01T00:00:00Z".into()),
            event_type: Some("flow".into()),
            sort_order: Some("asc".into()),
            sort_by: Some("timestamp".into()),
            size: Some(100),
            time_range: Some(60),
        };
        let query = options.to_query();
        assert_eq!(query.get("query_string"), Some("src_ip:10.1.1.1"));
        assert_eq!(query.get("max_ts"), Some("2020-01-02T00:00:00Z"));
        assert_eq!(query.get("min_ts"), Some("2020-01-01T00:00:00Z"));
        assert_eq!(query.get("event_type"), Some("flow"));
        assert_eq!(query.get("order"), Some("asc"));
        assert_eq!(query.get("sort_by"), Some("timestamp"));
        assert_eq!(query.get("size"), Some("100"));
        assert_eq!(query.get("time_range"), Some("60s"));
        assert_eq!(query.len(), 8);
    }

    #[test]
    fn test_event_query_all_and_zero_omitted() {
        let options = EventQueryOptions {
            event_type: Some("all".into()),
            size: Some(0),
            time_range: Some(0),
            ..Default::default()
        };
        assert!(options.to_query().is_empty());
    }

    #[test]
    fn test_event_query_is_deterministic() {
        let options = EventQueryOptions {
            query_string: Some("a".into()),
            size: Some(5),
            ..Default::default()
        };
        assert_eq!(options.to_query(), options.to_query());
    }

    #[test]
    fn test_flow_histogram_mapping() {
        let options = FlowHistogramOptions {
            app_proto: true,
            time_range: Some("3600s".into()),
            query_string: Some("proto:tcp".into()),
            interval: Some("5m".into()),
        };
        let query = options.to_query();
        assert_eq!(query.get("sub_aggs"), Some("app_proto"));
        assert_eq!(query.get("time_range"), Some("3600s"));
        assert_eq!(query.get("query_string"), Some("proto:tcp"));
        assert_eq!(query.get("interval"), Some("5m"));

        assert!(FlowHistogramOptions::default().to_query().is_empty());
    }

    #[test]
    fn test_alert_query_tags() {
        let options = AlertQueryOptions {
            query_string: Some("".into()),
            must_have_tags: vec!["escalated".into()],
            must_not_have_tags: vec!["archived".into(), "deleted".into()],
            time_range: Some("86400s".into()),
        };
        let query = options.to_query();
        assert_eq!(query.get("tags"), Some("escalated,-archived,-deleted"));
        assert_eq!(query.get("time_range"), Some("86400s"));
        assert_eq!(query.get("query_string"), Some(""));
    }

    #[test]
    fn test_alert_query_empty_tags_still_sent() {
        let query = AlertQueryOptions::default().to_query();
        assert_eq!(query.pairs(), &[("tags".to_string(), String::new())]);
    }
}
