//! Declarative inventory parsing.
//!
//! Parses the conventional INI-style fleet inventory: plain `[group]`
//! sections holding host lines, `[group:children]` sections nesting groups,
//! and `[group:vars]` sections holding `key=value` assignments. Host lines
//! may carry inline assignments (`web1 ansible_user=deploy`).
//!
//! The parsed [`Inventory`] is built fresh for every resolution request and
//! discarded afterwards, so edits to the file between calls are always
//! picked up.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use serde::Serialize;

use crate::{dlog_debug, Error, Result};

/// Matches a section header line such as `[web]` or `[prod:children]`.
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([^\]]+)\]\s*$").unwrap());

/// String-keyed scalar variables. BTreeMap so merged variable sets iterate
/// and serialize deterministically.
pub type VarMap = std::collections::BTreeMap<String, String>;

/// A named group of hosts.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    /// Hosts listed directly under the group's section header.
    pub hosts: Vec<String>,
    /// All member hosts, including those contributed by child groups,
    /// deduplicated in first-seen order.
    pub members: Vec<String>,
    pub vars: VarMap,
    /// Child group names in declaration order.
    pub children: Vec<String>,
}

impl Group {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hosts: Vec::new(),
            members: Vec::new(),
            vars: VarMap::new(),
            children: Vec::new(),
        }
    }

    /// Whether `host` is listed directly under this group's header.
    pub fn lists_directly(&self, host: &str) -> bool {
        self.hosts.iter().any(|h| h == host)
    }

    /// Whether `host` is a member, directly or through children.
    pub fn contains(&self, host: &str) -> bool {
        self.members.iter().any(|h| h == host)
    }
}

/// Host/group structure returned by the list operation.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryOverview {
    pub inventory: String,
    pub total_hosts: usize,
    /// Group name to transitive members, sorted by name.
    pub groups: std::collections::BTreeMap<String, Vec<String>>,
}

/// A fully parsed inventory.
///
/// Groups are kept in declaration order because variable precedence depends
/// on it: when two groups at the same precedence tier assign the same
/// variable, the later-declared group wins.
#[derive(Debug, Clone)]
pub struct Inventory {
    path: PathBuf,
    hosts: Vec<String>,
    groups: Vec<Group>,
    index: HashMap<String, usize>,
    host_vars: HashMap<String, VarMap>,
}

impl Inventory {
    /// Read and parse the inventory file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `InventoryNotFound` if the file does not exist and
    /// `InventoryParse` for malformed content.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::InventoryNotFound(path.to_path_buf()));
        }
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source, path.to_path_buf())
    }

    /// Parse inventory text. `origin` is recorded for display only.
    pub fn parse(source: &str, origin: PathBuf) -> Result<Self> {
        let mut parser = Parser::new(origin);
        for (idx, raw_line) in source.lines().enumerate() {
            parser.feed(idx + 1, raw_line)?;
        }
        let inventory = parser.finish()?;
        dlog_debug!(
            "Inventory::parse {}: {} hosts, {} groups",
            inventory.path.display(),
            inventory.hosts.len(),
            inventory.groups.len()
        );
        Ok(inventory)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every host in first-seen order.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Groups in declaration order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.index.get(name).map(|&i| &self.groups[i])
    }

    pub fn contains_host(&self, name: &str) -> bool {
        self.host_vars.contains_key(name) || self.hosts.iter().any(|h| h == name)
    }

    /// Merge the effective variables for `host`.
    ///
    /// Precedence, weakest first: `all` group vars, then groups containing
    /// the host only through children (inherited), then groups listing the
    /// host directly, then host-line vars. Within a tier, later-declared
    /// groups override earlier ones.
    pub fn host_variables(&self, host: &str) -> VarMap {
        let mut combined = VarMap::new();
        if let Some(all) = self.group("all") {
            combined.extend(all.vars.clone());
        }
        for group in &self.groups {
            if group.name == "all" {
                continue;
            }
            if group.contains(host) && !group.lists_directly(host) {
                combined.extend(group.vars.clone());
            }
        }
        for group in &self.groups {
            if group.name == "all" {
                continue;
            }
            if group.lists_directly(host) {
                combined.extend(group.vars.clone());
            }
        }
        if let Some(vars) = self.host_vars.get(host) {
            combined.extend(vars.clone());
        }
        combined
    }

    pub fn overview(&self) -> InventoryOverview {
        let groups = self
            .groups
            .iter()
            .map(|g| (g.name.clone(), g.members.clone()))
            .collect();
        InventoryOverview {
            inventory: self.path.display().to_string(),
            total_hosts: self.hosts.len(),
            groups,
        }
    }
}

/// Which section the parser is currently inside.
enum Section {
    None,
    Hosts(usize),
    Children(usize),
    Vars(usize),
}

struct Parser {
    path: PathBuf,
    hosts: Vec<String>,
    host_set: HashSet<String>,
    groups: Vec<Group>,
    index: HashMap<String, usize>,
    host_vars: HashMap<String, VarMap>,
    /// (parent group index, child name, line) for every children entry.
    edges: Vec<(usize, String, usize)>,
    section: Section,
}

impl Parser {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            hosts: Vec::new(),
            host_set: HashSet::new(),
            groups: Vec::new(),
            index: HashMap::new(),
            host_vars: HashMap::new(),
            edges: Vec::new(),
            section: Section::None,
        }
    }

    fn feed(&mut self, line: usize, raw: &str) -> Result<()> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }

        if let Some(caps) = SECTION_RE.captures(trimmed) {
            return self.enter_section(line, caps[1].trim());
        }

        match self.section {
            Section::Children(parent) => {
                // Only the first token names the child group
                if let Some(child) = trimmed.split_whitespace().next() {
                    self.edges.push((parent, child.to_string(), line));
                    self.groups[parent].children.push(child.to_string());
                }
                Ok(())
            }
            Section::Vars(group) => {
                if let Some((key, value)) = trimmed.split_once('=') {
                    self.groups[group]
                        .vars
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
                Ok(())
            }
            Section::Hosts(group) => self.add_host_line(line, trimmed, Some(group)),
            Section::None => self.add_host_line(line, trimmed, None),
        }
    }

    fn enter_section(&mut self, line: usize, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InventoryParse {
                line,
                message: "empty section name".to_string(),
            });
        }

        if let Some(base) = name.strip_suffix(":children") {
            let idx = self.ensure_group(line, base.trim())?;
            self.section = Section::Children(idx);
            return Ok(());
        }
        if let Some(base) = name.strip_suffix(":vars") {
            let idx = self.ensure_group(line, base.trim())?;
            self.section = Section::Vars(idx);
            return Ok(());
        }
        if name.contains(':') {
            return Err(Error::InventoryParse {
                line,
                message: format!("unrecognized section suffix in [{}]", name),
            });
        }

        let idx = self.ensure_group(line, name)?;
        self.section = Section::Hosts(idx);
        Ok(())
    }

    fn ensure_group(&mut self, line: usize, name: &str) -> Result<usize> {
        if name.is_empty() {
            return Err(Error::InventoryParse {
                line,
                message: "empty group name".to_string(),
            });
        }
        if self.host_set.contains(name) {
            return Err(Error::InventoryParse {
                line,
                message: format!("'{}' is declared as both a host and a group", name),
            });
        }
        if let Some(&idx) = self.index.get(name) {
            return Ok(idx);
        }
        self.groups.push(Group::new(name));
        let idx = self.groups.len() - 1;
        self.index.insert(name.to_string(), idx);
        Ok(idx)
    }

    fn add_host_line(&mut self, line: usize, content: &str, group: Option<usize>) -> Result<()> {
        let mut parts = content.split_whitespace();
        let host = match parts.next() {
            Some(h) => h,
            None => return Ok(()),
        };
        if host == "all" {
            return Err(Error::InventoryParse {
                line,
                message: "'all' is reserved for the implicit group".to_string(),
            });
        }
        if self.index.contains_key(host) {
            return Err(Error::InventoryParse {
                line,
                message: format!("'{}' is declared as both a host and a group", host),
            });
        }

        if self.host_set.insert(host.to_string()) {
            self.hosts.push(host.to_string());
        }

        let group_idx = match group {
            Some(idx) => idx,
            None => self.ensure_group(line, "ungrouped")?,
        };
        if !self.groups[group_idx].lists_directly(host) {
            self.groups[group_idx].hosts.push(host.to_string());
        }

        for assignment in parts {
            let Some((key, value)) = assignment.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            let vars = self.host_vars.entry(host.to_string()).or_default();
            if let Some(existing) = vars.get(key) {
                if existing != value {
                    return Err(Error::InventoryParse {
                        line,
                        message: format!(
                            "conflicting definition for host '{}': '{}' is '{}' here but '{}' earlier",
                            host, key, value, existing
                        ),
                    });
                }
            }
            vars.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Inventory> {
        self.resolve_children()?;

        // The implicit `all` group always holds every host. An explicit
        // [all] section contributes its vars; its membership is forced to
        // the full host list.
        let all_idx = match self.index.get("all") {
            Some(&idx) => idx,
            None => {
                self.groups.push(Group::new("all"));
                let idx = self.groups.len() - 1;
                self.index.insert("all".to_string(), idx);
                idx
            }
        };
        self.groups[all_idx].members = self.hosts.clone();

        Ok(Inventory {
            path: self.path,
            hosts: self.hosts,
            groups: self.groups,
            index: self.index,
            host_vars: self.host_vars,
        })
    }

    /// Validate the group graph and compute transitive membership.
    ///
    /// Children must form a DAG. A child naming a group that never gets
    /// declared contributes no members.
    fn resolve_children(&mut self) -> Result<()> {
        let mut graph: DiGraph<String, usize> = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
        for group in &self.groups {
            nodes.insert(group.name.clone(), graph.add_node(group.name.clone()));
        }
        for (parent_idx, child, line) in &self.edges {
            let parent = nodes[&self.groups[*parent_idx].name];
            let child_node = *nodes
                .entry(child.clone())
                .or_insert_with(|| graph.add_node(child.clone()));
            graph.add_edge(parent, child_node, *line);
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let name = graph[cycle.node_id()].clone();
            let line = graph
                .edges(cycle.node_id())
                .next()
                .map(|e| *e.weight())
                .unwrap_or(0);
            Error::InventoryParse {
                line,
                message: format!("cyclic group reference involving '{}'", name),
            }
        })?;

        // Children before parents so every child's membership is final
        // when its parents aggregate it.
        let mut members: HashMap<String, Vec<String>> = HashMap::new();
        for node in order.into_iter().rev() {
            let name = graph[node].clone();
            let resolved = match self.index.get(&name) {
                Some(&idx) => {
                    let mut list = self.groups[idx].hosts.clone();
                    for child in &self.groups[idx].children {
                        if let Some(contributed) = members.get(child) {
                            list.extend(contributed.iter().cloned());
                        }
                    }
                    let list = dedupe(list);
                    self.groups[idx].members = list.clone();
                    list
                }
                None => Vec::new(),
            };
            members.insert(name, resolved);
        }
        Ok(())
    }
}

fn dedupe(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if seen.insert(value.clone()) {
            out.push(value);
        }
    }
    out
}
