//! Watch record decoding and admission.

use msched_kube::{Pod, WatchEvent, WatchEventType};

/// A decoded pod watch record.
pub type PodEvent = WatchEvent<Pod>;

/// Decode one raw watch record.
pub fn decode(record: &[u8]) -> Result<PodEvent, serde_json::Error> {
    serde_json::from_slice(record)
}

/// True for a newly added, still unbound, pending pod that asks for `scheduler_name`.
pub fn wants_scheduling(event: &PodEvent, scheduler_name: &str) -> bool {
    let pod = &event.object;
    event.event_type == WatchEventType::Added
        && pod.status.phase == "Pending"
        && pod.spec.scheduler_name == scheduler_name
        && pod.spec.node_name.as_deref().map_or(true, str::is_empty)
}

/// The parts of a pod a decision task needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPod {
    pub namespace: String,
    pub name: String,
    /// Value of the pod's `name` label, used to find its deployment on fallback.
    pub name_label: Option<String>,
}

impl From<Pod> for PendingPod {
    fn from(pod: Pod) -> Self {
        let mut metadata = pod.metadata;
        Self {
            name_label: metadata.labels.remove("name"),
            namespace: metadata.namespace,
            name: metadata.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn record(event_type: &str, phase: &str, scheduler: &str, node_name: Option<&str>) -> Vec<u8> {
        let mut spec = serde_json::json!({ "schedulerName": scheduler });
        if let Some(node) = node_name {
            spec["nodeName"] = node.into();
        }
        serde_json::to_vec(&serde_json::json!({
            "type": event_type,
            "object": {
                "metadata": {"name": "pod-a", "namespace": "default", "labels": {"name": "web"}},
                "spec": spec,
                "status": {"phase": phase}
            }
        }))
        .unwrap()
    }

    #[rstest]
    #[case("ADDED", "Pending", "custom", None, true)]
    #[case("ADDED", "Pending", "custom", Some(""), true)]
    #[case("MODIFIED", "Pending", "custom", None, false)]
    #[case("DELETED", "Pending", "custom", None, false)]
    #[case("ADDED", "Running", "custom", None, false)]
    #[case("ADDED", "Pending", "other", None, false)]
    #[case("ADDED", "Pending", "custom", Some("node-1"), false)]
    fn test_wants_scheduling(
        #[case] event_type: &str,
        #[case] phase: &str,
        #[case] scheduler: &str,
        #[case] node_name: Option<&str>,
        #[case] expected: bool,
    ) {
        let event = decode(&record(event_type, phase, scheduler, node_name)).unwrap();
        assert_eq!(wants_scheduling(&event, "custom"), expected);
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        assert!(decode(b"not json").is_err());
        assert!(decode(br#"{"object":{}}"#).is_err());
    }

    #[test]
    fn test_pending_pod_from_pod() {
        let event = decode(&record("ADDED", "Pending", "custom", None)).unwrap();
        let pod = PendingPod::from(event.object);
        assert_eq!(
            pod,
            PendingPod {
                namespace: "default".to_string(),
                name: "pod-a".to_string(),
                name_label: Some("web".to_string()),
            }
        );
    }
}
