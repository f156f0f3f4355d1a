//! Response decoder
//!
//! Single consumer of the receive queue. Each datagram is inflated, parsed
//! and validated, then merged into the registry and reported to the sink.
//! Datagrams are handled strictly in arrival order.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use meshpulse_core::{Node, NodeId, ResponseData};
use meshpulse_state::{Connection, Nodes};

use crate::error::{CollectorError, Result};
use crate::receiver::RawDatagram;

/// Inflate and parse a raw payload
pub fn parse(payload: &[u8]) -> Result<ResponseData> {
    let json = miniz_oxide::inflate::decompress_to_vec(payload)
        .map_err(|e| CollectorError::Decompress(format!("{e:?}")))?;
    Ok(serde_json::from_slice(&json)?)
}

/// Decode a payload into the node it describes.
///
/// Fragments whose own node id disagrees with the accepted one are removed;
/// their names are returned alongside.
pub fn decode(payload: &[u8]) -> Result<(NodeId, ResponseData, Vec<&'static str>)> {
    let mut data = parse(payload)?;
    let candidate = data
        .candidate_node_id()
        .ok_or(CollectorError::MissingNodeId)?
        .to_string();
    let id = NodeId::new(candidate)?;
    let dropped = data.retain_node(id.as_str());
    Ok((id, data, dropped))
}

/// Merges decoded replies into the registry
pub struct Decoder {
    nodes: Arc<Nodes>,
    sink: Option<Arc<dyn Connection>>,
}

impl Decoder {
    /// Create a decoder writing to `nodes` and optionally `sink`
    pub fn new(nodes: Arc<Nodes>, sink: Option<Arc<dyn Connection>>) -> Self {
        Self { nodes, sink }
    }

    /// Decode one datagram and merge it
    pub fn handle(&self, datagram: &RawDatagram) -> Result<Node> {
        let (id, data, dropped) = decode(&datagram.payload)?;
        if !dropped.is_empty() {
            info!(
                node_id = %id,
                from = %datagram.from,
                fragments = ?dropped,
                "Dropped fragments with mismatching node id"
            );
        }

        let has_neighbours = data.neighbours.is_some();
        let node = self.nodes.update_from(&id, data, datagram.from);

        if let Some(sink) = &self.sink {
            sink.insert_node(&node);
            if has_neighbours {
                let links = {
                    let view = self.nodes.read();
                    view.get(&id).map(|stored| view.links(stored)).unwrap_or_default()
                };
                for link in &links {
                    sink.insert_link(link, node.lastseen);
                }
            }
        }

        Ok(node)
    }

    /// Drain `queue` until shutdown or until every sender is gone
    pub fn spawn(
        self,
        mut queue: mpsc::Receiver<RawDatagram>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let datagram = tokio::select! {
                    datagram = queue.recv() => match datagram {
                        Some(datagram) => datagram,
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                };

                match self.handle(&datagram) {
                    Ok(node) => debug!(
                        from = %datagram.from,
                        lastseen = %node.lastseen,
                        "Response merged"
                    ),
                    Err(e @ CollectorError::InvalidNodeId(_)) | Err(e @ CollectorError::MissingNodeId) => {
                        warn!(from = %datagram.from, error = %e, "Response rejected")
                    }
                    Err(e) => warn!(
                        from = %datagram.from,
                        error = %e,
                        code = e.error_code(),
                        "Unable to decode response"
                    ),
                }
            }
            debug!("Decoder stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{compress, RecordingSink};
    use bytes::Bytes;

    fn datagram(json: &str) -> RawDatagram {
        RawDatagram {
            from: "[fe80::1]:1001".parse().unwrap(),
            payload: Bytes::from(compress(json.as_bytes())),
        }
    }

    #[test]
    fn test_decode_full() {
        let (id, data, dropped) = decode(&compress(
            br#"{
                "nodeinfo": {"node_id": "aabbccddeeff", "hostname": "gw01"},
                "statistics": {"node_id": "aabbccddeeff", "clients": {"total": 3}},
                "neighbours": {"node_id": "aabbccddeeff"}
            }"#,
        ))
        .unwrap();

        assert_eq!(id.as_str(), "aabbccddeeff");
        assert!(dropped.is_empty());
        assert_eq!(data.statistics.unwrap().clients.total, 3);
    }

    #[test]
    fn test_mismatching_fragment_nulled() {
        let (_, data, dropped) = decode(&compress(
            br#"{
                "nodeinfo": {"node_id": "aabbccddeeff"},
                "statistics": {"node_id": "000000000000"},
                "neighbours": {"node_id": "aabbccddeeff"}
            }"#,
        ))
        .unwrap();

        assert_eq!(dropped, vec!["statistics"]);
        assert!(data.statistics.is_none());
        assert!(data.nodeinfo.is_some());
        assert!(data.neighbours.is_some());
    }

    #[test]
    fn test_invalid_node_id() {
        let err = decode(&compress(br#"{"nodeinfo": {"node_id": "abc"}}"#)).unwrap_err();
        assert!(matches!(err, CollectorError::InvalidNodeId(_)));

        let err = decode(&compress(br#"{}"#)).unwrap_err();
        assert!(matches!(err, CollectorError::MissingNodeId));
    }

    #[test]
    fn test_garbage() {
        let err = decode(b"definitely not deflate").unwrap_err();
        assert!(err.is_decode_error());

        let err = decode(&compress(b"not json")).unwrap_err();
        assert!(matches!(err, CollectorError::Parse(_)));
    }

    #[test]
    fn test_invalid_id_never_reaches_registry() {
        let nodes = Arc::new(Nodes::new());
        let decoder = Decoder::new(nodes.clone(), None);

        assert!(decoder
            .handle(&datagram(r#"{"statistics": {"node_id": "aabbccddeeffaa"}}"#))
            .is_err());
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_nodeinfo_round_trip() {
        let nodes = Arc::new(Nodes::new());
        let decoder = Decoder::new(nodes.clone(), None);
        let json = r#"{"nodeinfo": {
            "node_id": "aabbccddeeff",
            "hostname": "gw01",
            "network": {"mac": "aa:bb:cc:dd:ee:ff", "addresses": ["fe80::1"]},
            "system": {"site_code": "ffhb", "domain_code": "city"},
            "location": {"latitude": 53.07, "longitude": 8.8},
            "owner": {"contact": "mail@example.org"},
            "software": {"firmware": {"base": "gluon", "release": "2024.1"}},
            "hardware": {"nproc": 2, "model": "TP-Link"},
            "vpn": true
        }}"#;
        let expected: ResponseData = serde_json::from_str(json).unwrap();

        decoder.handle(&datagram(json)).unwrap();
        let node = nodes.get(&NodeId::new("aabbccddeeff").unwrap()).unwrap();

        assert_eq!(node.nodeinfo, expected.nodeinfo);
        assert!(node.is_gateway());
        assert_eq!(node.address, Some("[fe80::1]:1001".parse().unwrap()));
    }

    #[test]
    fn test_sink_receives_node_and_links() {
        let nodes = Arc::new(Nodes::new());
        let sink = Arc::new(RecordingSink::default());
        let decoder = Decoder::new(nodes.clone(), Some(sink.clone()));

        decoder
            .handle(&datagram(
                r#"{"nodeinfo": {"node_id": "aabbccddee02", "network": {"mac": "aa:bb:cc:dd:ee:02"}}}"#,
            ))
            .unwrap();
        decoder
            .handle(&datagram(
                r#"{"neighbours": {"node_id": "aabbccddee01", "batadv": {
                    "aa:bb:cc:dd:ee:01": {"neighbours": {"aa:bb:cc:dd:ee:02": {"tq": 200, "lastseen": 1.2}}}
                }}}"#,
            ))
            .unwrap();

        assert_eq!(sink.nodes().len(), 2);
        let links = sink.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_id, "aabbccddee02");
    }

    #[test]
    fn test_links_share_node_lastseen() {
        let nodes = Arc::new(Nodes::new());
        let sink = Arc::new(RecordingSink::default());
        let decoder = Decoder::new(nodes.clone(), Some(sink.clone()));

        decoder
            .handle(&datagram(
                r#"{"nodeinfo": {"node_id": "aabbccddee02", "network": {"mac": "aa:bb:cc:dd:ee:02"}}}"#,
            ))
            .unwrap();
        let node = decoder
            .handle(&datagram(
                r#"{"neighbours": {"node_id": "aabbccddee01", "batadv": {
                    "aa:bb:cc:dd:ee:01": {"neighbours": {"aa:bb:cc:dd:ee:02": {"tq": 200}}}
                }}}"#,
            ))
            .unwrap();

        assert_eq!(sink.link_times(), vec![node.lastseen]);
    }

    #[test]
    fn test_null_fields_keep_reply() {
        let nodes = Arc::new(Nodes::new());
        let decoder = Decoder::new(nodes.clone(), None);

        decoder
            .handle(&datagram(
                r#"{
                    "nodeinfo": {"node_id": "aabbccddeeff", "hostname": "gw01",
                        "hardware": {"model": null}, "system": null},
                    "statistics": {"node_id": "aabbccddeeff", "clients": {"total": null, "wifi": 2}}
                }"#,
            ))
            .unwrap();

        let node = nodes.get(&NodeId::new("aabbccddeeff").unwrap()).unwrap();
        let info = node.nodeinfo.unwrap();
        assert_eq!(info.hostname, "gw01");
        assert!(info.hardware.model.is_empty());
        let clients = node.statistics.unwrap().clients;
        assert_eq!(clients.total, 0);
        assert_eq!(clients.wifi, 2);
    }
}
