use crate::{error::Error, pose::KeypointLink};
use bitvec::bitvec;
use std::collections::HashMap;

/// Module settings accepted by the pose decoder.
#[derive(Debug, Clone, serde::Deserialize)]
pub(super) struct PosenetSettings {
    /// Overrides the configured threshold, in percent.
    #[serde(default)]
    pub(super) confidence: Option<f64>,
    pub(super) posenet: Vec<SkeletonNode>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub(super) struct SkeletonNode {
    pub(super) id: u32,
    pub(super) links: Vec<u32>,
    /// Keypoint this one is drawn connected to.
    #[serde(default)]
    pub(super) connection: Option<u32>,
}

/// Skeleton topology: traversal edges and display connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Skeleton {
    /// Tree edges in depth-first order starting at keypoint 0. Edge `i` owns
    /// channel `i` of each displacement block.
    pub(crate) links: Vec<KeypointLink>,
    pub(crate) connections: Vec<KeypointLink>,
}

impl Skeleton {
    pub(super) fn from_nodes(nodes: &[SkeletonNode]) -> Result<Self, Error> {
        let by_id = nodes
            .iter()
            .map(|node| (node.id, node))
            .collect::<HashMap<_, _>>();
        let root = by_id.get(&0).ok_or(Error::MissingSkeletonRoot)?;

        let max_id = nodes.iter().map(|node| node.id).max().unwrap_or(0) as usize;
        let mut visited = bitvec![0; max_id + 1];
        visited.set(0, true);

        let mut links = Vec::new();
        load_links(root, &by_id, &mut visited, &mut links)?;

        let connections = nodes
            .iter()
            .filter_map(|node| {
                node.connection
                    .map(|connection| KeypointLink::new(node.id, connection))
            })
            .collect();

        Ok(Self { links, connections })
    }

    /// Largest keypoint id referenced anywhere in the skeleton.
    pub(crate) fn max_keypoint_id(&self) -> Option<u32> {
        self.links
            .iter()
            .chain(&self.connections)
            .flat_map(|link| [link.source, link.destination])
            .max()
    }
}

fn load_links(
    node: &SkeletonNode,
    by_id: &HashMap<u32, &SkeletonNode>,
    visited: &mut bitvec::vec::BitVec,
    links: &mut Vec<KeypointLink>,
) -> Result<(), Error> {
    for &destination in &node.links {
        links.push(KeypointLink::new(node.id, destination));

        let child = by_id
            .get(&destination)
            .ok_or(Error::MissingSkeletonNode(destination))?;
        let index = destination as usize;
        if visited[index] {
            return Err(Error::SkeletonNotATree(destination));
        }
        visited.set(index, true);

        load_links(child, by_id, visited, links)?;
    }
    Ok(())
}
