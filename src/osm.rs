use crate::feature::Tags;

#[derive(Debug, Clone, PartialEq)]
pub struct OsmNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsmWay {
    pub id: i64,
    pub node_refs: Vec<i64>,
    pub tags: Tags,
}

/// A single fragment produced by the mapper, prior to serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum OsmElement {
    Node(OsmNode),
    Way(OsmWay),
}

impl OsmElement {
    pub fn id(&self) -> i64 {
        match self {
            OsmElement::Node(node) => node.id,
            OsmElement::Way(way) => way.id,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            OsmElement::Node(node) => &node.tags,
            OsmElement::Way(way) => &way.tags,
        }
    }

    pub fn get_tag(&self, key: &str) -> Option<&str> {
        self.tags()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn as_node(&self) -> Option<&OsmNode> {
        match self {
            OsmElement::Node(node) => Some(node),
            OsmElement::Way(_) => None,
        }
    }

    pub fn as_way(&self) -> Option<&OsmWay> {
        match self {
            OsmElement::Node(_) => None,
            OsmElement::Way(way) => Some(way),
        }
    }
}

pub fn is_closed_way(way: &OsmWay) -> bool {
    !way.node_refs.is_empty() && way.node_refs.first() == way.node_refs.last()
}
