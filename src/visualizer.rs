use std::collections::HashMap;

use petgraph::dot::Dot;
use petgraph::stable_graph::EdgeReference;
use petgraph::{graph::EdgeIndex, graph::NodeIndex, prelude::StableGraph};

use crate::fa::FA;

/// Build a graph of the automaton. Nodes are labelled with the state id and the rules the state
/// accepts, parallel transitions are merged into one edge listing every symbol.
pub fn generate_stable_graph<T: FA>(
    fa: &T,
    rule_name: &dyn Fn(usize) -> String,
) -> StableGraph<String, String> {
    let mut stable_graph: StableGraph<String, String> = StableGraph::new();

    let num_states = fa.get_num_states();

    let mut edge_map: HashMap<(NodeIndex, NodeIndex), EdgeIndex> = HashMap::new();

    // Add all nodes

    for state_idx in 0..num_states {
        let rules: Vec<String> = fa
            .get_state_rules(state_idx)
            .into_iter()
            .map(rule_name)
            .collect();
        let node_label = if rules.is_empty() {
            format!("{}", state_idx)
        } else {
            format!("{} [{}]", state_idx, rules.join(", "))
        };
        stable_graph.add_node(node_label);
    }

    // Add all edges, appending to the label when the edge already exists

    for state_idx in 0..num_states {
        for (symbol, edge_target) in fa.get_state_transitions(state_idx) {
            let key = (NodeIndex::new(state_idx), NodeIndex::new(edge_target));

            if let Some(edge_idx) = edge_map.get(&key) {
                if let Some(label) = stable_graph.edge_weight_mut(*edge_idx) {
                    label.push_str(", ");
                    label.push_str(&symbol.to_string());
                }
            } else {
                let edge_idx = stable_graph.add_edge(key.0, key.1, symbol.to_string());
                edge_map.insert(key, edge_idx);
            }
        }
    }

    stable_graph
}

/// Render the automaton in graphviz dot format. Accepting states are drawn as double circles
/// and the start state in bold.
pub fn to_dot<T: FA>(fa: &T, rule_name: &dyn Fn(usize) -> String) -> String {
    let graph = generate_stable_graph(fa, rule_name);
    let accept_states = fa.get_acceptor_states();
    let start_state = fa.get_start_state();

    let edge_attrs = |_: &StableGraph<String, String>, _: EdgeReference<String>| String::new();
    let node_attrs = |_: &StableGraph<String, String>, (node, _): (NodeIndex, &String)| {
        let state_idx = node.index();
        let shape = if accept_states[state_idx] {
            "doublecircle"
        } else {
            "circle"
        };
        if state_idx == start_state {
            format!("shape = {}, style = bold", shape)
        } else {
            format!("shape = {}", shape)
        }
    };
    let dot = Dot::with_attr_getters(&graph, &[], &edge_attrs, &node_attrs);

    format!("{}", dot)
}

#[cfg(test)]
mod visualizer_tests {
    use super::*;
    use crate::dfa::{construct_dfa, construct_minimal_dfa};
    use crate::nfa::{construct_nfa, NoVariables};
    use crate::regex::build_syntax_tree;

    fn rule_name(rule: usize) -> String {
        format!("R{}", rule)
    }

    #[test]
    fn test_nfa_graph() {
        let tree = build_syntax_tree("a", false).unwrap();
        let nfa = construct_nfa(4, &NoVariables, &tree).unwrap();
        let graph = generate_stable_graph(&nfa, &rule_name);

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node_weight(NodeIndex::new(1)).unwrap(), "1 [R4]");
    }

    #[test]
    fn test_parallel_edges_are_merged() {
        let tree = build_syntax_tree("a|c", false).unwrap();
        let nfa = construct_nfa(0, &NoVariables, &tree).unwrap();
        let dfa = construct_minimal_dfa(&construct_dfa(&nfa, &[0]));
        let graph = generate_stable_graph(&dfa, &rule_name);

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        let edge = graph.edge_indices().next().unwrap();
        assert_eq!(graph.edge_weight(edge).unwrap(), "a, c");
    }

    #[test]
    fn test_dot_output() {
        let tree = build_syntax_tree("ab", false).unwrap();
        let nfa = construct_nfa(0, &NoVariables, &tree).unwrap();
        let dfa = construct_minimal_dfa(&construct_dfa(&nfa, &[0]));
        let dot = to_dot(&dfa, &rule_name);

        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("doublecircle"));
        assert!(dot.contains("style = bold"));
        assert!(dot.contains("R0"));
    }
}
