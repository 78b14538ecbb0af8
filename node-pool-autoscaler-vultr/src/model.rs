use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NodePool {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub status: String,
    pub node_quantity: u32,
    #[serde(default)]
    pub min_nodes: u32,
    #[serde(default)]
    pub max_nodes: u32,
    #[serde(default)]
    pub auto_scaler: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub date_created: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NodePoolResponse {
    pub node_pool: NodePool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NodePoolsResponse {
    pub node_pools: Vec<NodePool>,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Meta {
    #[serde(default)]
    pub links: Links,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Links {
    /// Cursor of the next page, empty on the last one.
    #[serde(default)]
    pub next: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct NodePoolUpdate {
    pub node_quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_node_pool_listing() {
        let body = r#"{
            "node_pools": [{
                "id": "e97bdee9-2781-4f31-be03-60fc75f399ae",
                "date_created": "2021-07-07T22:57:01+00:00",
                "label": "my-label-48770259",
                "tag": "",
                "plan": "vc2-4c-8gb",
                "status": "active",
                "node_quantity": 2,
                "min_nodes": 1,
                "max_nodes": 4,
                "auto_scaler": true,
                "nodes": [{
                    "id": "f2e11430-76e5-4dc6-a1c9-ef5682c21ddf",
                    "label": "my-label-48770259-48770259",
                    "date_created": "2021-07-07T22:57:01+00:00",
                    "status": "pending"
                }]
            }],
            "meta": { "total": 1, "links": { "next": "bmV4dF9fQ0xPVUQ=", "prev": "" } }
        }"#;

        let page: NodePoolsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(page.meta.links.next, "bmV4dF9fQ0xPVUQ=");

        let pool = &page.node_pools[0];
        assert!(pool.auto_scaler);
        assert_eq!((pool.min_nodes, pool.max_nodes, pool.node_quantity), (1, 4, 2));
        assert_eq!(pool.nodes[0].status, "pending");
    }

    #[test]
    fn missing_meta_means_single_page() {
        let page: NodePoolsResponse =
            serde_json::from_str(r#"{ "node_pools": [] }"#).unwrap();
        assert!(page.meta.links.next.is_empty());
    }
}
