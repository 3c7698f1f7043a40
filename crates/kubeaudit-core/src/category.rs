//! Resource categories and the policy query each one reads.
//!
//! Categories that share a rule library also share a query entry point:
//! workloads are checked by one package, RBAC objects by another, and nodes
//! and events each have their own.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the nine fixed resource categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Deployments,
    DaemonSets,
    StatefulSets,
    Jobs,
    CronJobs,
    Roles,
    ClusterRoles,
    Nodes,
    Events,
}

impl Category {
    /// Every category, in the order reports are collected.
    pub const ALL: [Category; 9] = [
        Category::Deployments,
        Category::DaemonSets,
        Category::StatefulSets,
        Category::Jobs,
        Category::CronJobs,
        Category::Roles,
        Category::ClusterRoles,
        Category::Nodes,
        Category::Events,
    ];

    /// Plural name used in bundles and reports (e.g. "Deployments").
    pub fn name(&self) -> &'static str {
        match self {
            Category::Deployments => "Deployments",
            Category::DaemonSets => "DaemonSets",
            Category::StatefulSets => "StatefulSets",
            Category::Jobs => "Jobs",
            Category::CronJobs => "CronJobs",
            Category::Roles => "Roles",
            Category::ClusterRoles => "ClusterRoles",
            Category::Nodes => "Nodes",
            Category::Events => "Events",
        }
    }

    /// Object kind stored in this category (e.g. "Deployment").
    pub fn kind(&self) -> &'static str {
        match self {
            Category::Deployments => "Deployment",
            Category::DaemonSets => "DaemonSet",
            Category::StatefulSets => "StatefulSet",
            Category::Jobs => "Job",
            Category::CronJobs => "CronJob",
            Category::Roles => "Role",
            Category::ClusterRoles => "ClusterRole",
            Category::Nodes => "Node",
            Category::Events => "Event",
        }
    }

    /// Map an object kind to the category that validates it.
    pub fn from_kind(kind: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.kind() == kind)
    }

    /// The rule library group this category is checked against.
    pub fn query_group(&self) -> QueryGroup {
        match self {
            Category::Deployments
            | Category::DaemonSets
            | Category::StatefulSets
            | Category::Jobs
            | Category::CronJobs => QueryGroup::Workloads,
            Category::Roles | Category::ClusterRoles => QueryGroup::Rbac,
            Category::Nodes => QueryGroup::Nodes,
            Category::Events => QueryGroup::Events,
        }
    }

    /// Default query entry point for this category.
    pub fn default_query(&self) -> &'static str {
        self.query_group().default_entry_point()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A group of categories sharing one query entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryGroup {
    Workloads,
    Rbac,
    Nodes,
    Events,
}

impl QueryGroup {
    pub fn default_entry_point(&self) -> &'static str {
        match self {
            QueryGroup::Workloads => "data.kubeeye_workloads_rego",
            QueryGroup::Rbac => "data.kubeeye_RBAC_rego",
            QueryGroup::Nodes => "data.kubeeye_nodes_rego",
            QueryGroup::Events => "data.kubeeye_events_rego",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workloads_share_entry_point() {
        let workloads = [
            Category::Deployments,
            Category::DaemonSets,
            Category::StatefulSets,
            Category::Jobs,
            Category::CronJobs,
        ];
        for category in workloads {
            assert_eq!(category.default_query(), "data.kubeeye_workloads_rego");
        }
    }

    #[test]
    fn test_rbac_share_entry_point() {
        assert_eq!(Category::Roles.query_group(), QueryGroup::Rbac);
        assert_eq!(Category::ClusterRoles.query_group(), QueryGroup::Rbac);
        assert_eq!(Category::Roles.default_query(), "data.kubeeye_RBAC_rego");
    }

    #[test]
    fn test_nodes_and_events_have_own_entry_points() {
        assert_eq!(Category::Nodes.default_query(), "data.kubeeye_nodes_rego");
        assert_eq!(Category::Events.default_query(), "data.kubeeye_events_rego");
    }

    #[test]
    fn test_from_kind() {
        assert_eq!(Category::from_kind("ClusterRole"), Some(Category::ClusterRoles));
        assert_eq!(Category::from_kind("CronJob"), Some(Category::CronJobs));
        assert_eq!(Category::from_kind("Pod"), None);
    }

    #[test]
    fn test_serialized_as_plural_name() {
        let json = serde_json::to_string(&Category::StatefulSets).unwrap();
        assert_eq!(json, "\"StatefulSets\"");
        for category in Category::ALL {
            assert_eq!(category.to_string(), category.name());
        }
    }
}
