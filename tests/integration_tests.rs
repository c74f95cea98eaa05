mod integration_tests_helper {

    use lexforge::grammar::{Grammar, RuleDecl, SectionDecl};
    use lexforge::regex::RegEx;
    use lexforge::LexicalAnalyzer;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    pub fn compile_single_rule(pattern: &str) -> LexicalAnalyzer {
        let grammar = Grammar::new(SectionDecl::new("main").rule(RuleDecl::rule("R", pattern, 1)));
        LexicalAnalyzer::compile(&grammar).unwrap()
    }

    pub fn sample_grammar_path() -> PathBuf {
        let manifest_dir = env!("CARGO_MANIFEST_DIR");

        let mut grammar_path = PathBuf::from(manifest_dir);
        grammar_path.push("test_data/sample_grammar.json");
        grammar_path
    }

    /// Every string over the alphabet with at most `max_len` characters.
    pub fn all_strings(alphabet: &[char], max_len: usize) -> Vec<String> {
        let mut result = vec![String::new()];
        let mut frontier = vec![String::new()];
        for _ in 0..max_len {
            let mut next = Vec::new();
            for prefix in &frontier {
                for ch in alphabet {
                    let mut word = prefix.clone();
                    word.push(*ch);
                    next.push(word);
                }
            }
            result.extend(next.iter().cloned());
            frontier = next;
        }
        result
    }

    // Positions where a match of the tree starting at `start` can end
    fn match_ends(tree: &RegEx, input: &[char], start: usize) -> BTreeSet<usize> {
        match tree {
            RegEx::Literal(ch) => input
                .get(start)
                .filter(|c| *c == ch)
                .map(|_| start + 1)
                .into_iter()
                .collect(),
            RegEx::CharClass(ranges) => input
                .get(start)
                .filter(|c| ranges.iter().any(|range| range.contains(**c as u32)))
                .map(|_| start + 1)
                .into_iter()
                .collect(),
            RegEx::Concat(items) => items.iter().fold(BTreeSet::from([start]), |ends, item| {
                ends.iter()
                    .flat_map(|end| match_ends(item, input, *end))
                    .collect()
            }),
            RegEx::Alternation(items) => items
                .iter()
                .flat_map(|item| match_ends(item, input, start))
                .collect(),
            RegEx::Repeat(inner, min, max) => {
                let min = *min as usize;
                let limit = max.map_or(min + input.len() + 1, |max| max as usize);
                let mut result = BTreeSet::new();
                let mut current = BTreeSet::from([start]);
                if min == 0 {
                    result.insert(start);
                }
                for count in 1..=limit {
                    current = current
                        .iter()
                        .flat_map(|end| match_ends(inner, input, *end))
                        .collect();
                    if current.is_empty() {
                        break;
                    }
                    if count >= min {
                        result.extend(current.iter().copied());
                    }
                }
                result
            }
            RegEx::Variable(name) => panic!("unexpected variable {}", name),
        }
    }

    /// Reference matcher working directly on the syntax tree
    pub fn ast_matches(tree: &RegEx, input: &str) -> bool {
        let chars: Vec<char> = input.chars().collect();
        match_ends(tree, &chars, 0).contains(&chars.len())
    }
}

mod integration_tests {
    use crate::integration_tests_helper::{
        all_strings, ast_matches, compile_single_rule, sample_grammar_path,
    };

    use lexforge::backend::BackendOptions;
    use lexforge::construct_minimal_dfa;
    use lexforge::error::{CompileError, NameKind, RuleError};
    use lexforge::grammar::{Grammar, Pattern, RuleDecl, SectionDecl};
    use lexforge::scanner::{Scanner, ScannerError};
    use lexforge::{build_syntax_tree, BackendRegistry, LexicalAnalyzer};

    #[test]
    fn test_language_equivalence() {
        let patterns = [
            "(a|b)*abb",
            "a(b|c)?c+",
            "(ab|a)(bc|c)",
            "[ab]{2,3}c?",
            "(a*b*)*c",
            "a{0,2}b{1,}",
            "[^b]a|b+",
            "((a|b)(a|c))*",
            "a{,2}(bc){2}|c.",
        ];
        let inputs = all_strings(&['a', 'b', 'c'], 5);

        for pattern in patterns {
            let tree = build_syntax_tree(pattern, false).unwrap();
            let analyzer = compile_single_rule(pattern);

            for input in &inputs {
                assert_eq!(
                    analyzer.classify("main", input).is_some(),
                    ast_matches(&tree, input),
                    "pattern {} on input {:?}",
                    pattern,
                    input
                );
            }
        }
    }

    #[test]
    fn test_minimization_idempotence() {
        let analyzer = LexicalAnalyzer::compile(&Grammar::load(sample_grammar_path()).unwrap()).unwrap();
        for section in analyzer.sections() {
            let dfa = section.get_dfa();
            assert_eq!(&construct_minimal_dfa(dfa), dfa, "section {}", section.get_name());
        }
    }

    #[test]
    fn test_keyword_priority() {
        let grammar = Grammar::new(
            SectionDecl::new("main")
                .rule(RuleDecl::rule("KEYWORD_IF", "if", 1))
                .rule(RuleDecl::rule("IDENTIFIER", "[a-z]+", 2)),
        );
        let analyzer = LexicalAnalyzer::compile(&grammar).unwrap();

        assert_eq!(analyzer.classify("main", "if").unwrap().get_id(), Some("KEYWORD_IF"));
        assert_eq!(analyzer.classify("main", "i").unwrap().get_id(), Some("IDENTIFIER"));
    }

    #[test]
    fn test_case_insensitive_pattern() {
        let grammar = Grammar::new(
            SectionDecl::new("main").rule(RuleDecl::rule("AB", "AB", 1).case_insensitive()),
        );
        let analyzer = LexicalAnalyzer::compile(&grammar).unwrap();

        for input in ["ab", "Ab", "aB", "AB"] {
            assert!(analyzer.classify("main", input).is_some(), "{}", input);
        }
        assert!(analyzer.classify("main", "ac").is_none());
    }

    #[test]
    fn test_variable_expands_like_its_pattern() {
        let with_variable = Grammar::new(
            SectionDecl::new("main")
                .define("greeting", Pattern::new("hi"), 1)
                .rule(RuleDecl::rule("HELLO", "{greeting}", 2)),
        );
        let literal = Grammar::new(SectionDecl::new("main").rule(RuleDecl::rule("HELLO", "hi", 2)));

        let with_variable = LexicalAnalyzer::compile(&with_variable).unwrap();
        let literal = LexicalAnalyzer::compile(&literal).unwrap();
        assert_eq!(with_variable.root().get_dfa(), literal.root().get_dfa());
    }

    #[test]
    fn test_variable_keeps_its_own_case_flag() {
        let insensitive_rule = Grammar::new(
            SectionDecl::new("main")
                .define("word", Pattern::new("ab"), 1)
                .rule(RuleDecl::rule("WORD", "x{word}", 2).case_insensitive()),
        );
        let analyzer = LexicalAnalyzer::compile(&insensitive_rule).unwrap();
        for input in ["xab", "Xab"] {
            assert!(analyzer.classify("main", input).is_some(), "{}", input);
        }
        for input in ["xAB", "XaB"] {
            assert!(analyzer.classify("main", input).is_none(), "{}", input);
        }

        let insensitive_variable = Grammar::new(
            SectionDecl::new("main")
                .define("word", Pattern::case_insensitive("ab"), 1)
                .rule(RuleDecl::rule("WORD", "x{word}", 2)),
        );
        let analyzer = LexicalAnalyzer::compile(&insensitive_variable).unwrap();
        for input in ["xab", "xAB", "xaB"] {
            assert!(analyzer.classify("main", input).is_some(), "{}", input);
        }
        for input in ["XAB", "Xab"] {
            assert!(analyzer.classify("main", input).is_none(), "{}", input);
        }
    }

    #[test]
    fn test_final_ids_are_the_rules_accepting_the_input() {
        let patterns = ["ab|cd", "ab", "[a-c]+", "a*b", "c?d", "(a|b)*"];
        let mut section = SectionDecl::new("main");
        for (rule, pattern) in patterns.iter().enumerate() {
            section = section.rule(RuleDecl::rule(&format!("R{}", rule), pattern, rule + 1));
        }
        let analyzer = LexicalAnalyzer::compile(&Grammar::new(section)).unwrap();
        let dfa = analyzer.root().get_dfa();
        let trees: Vec<_> = patterns
            .iter()
            .map(|pattern| build_syntax_tree(pattern, false).unwrap())
            .collect();

        for input in all_strings(&['a', 'b', 'c', 'd'], 4) {
            let expected: Vec<usize> = trees
                .iter()
                .enumerate()
                .filter(|(_, tree)| ast_matches(tree, &input))
                .map(|(rule, _)| rule)
                .collect();
            let found = dfa
                .run(&input)
                .map(|state| dfa.get_state(state).get_final_ids().to_vec())
                .unwrap_or_default();
            assert_eq!(found, expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_inherited_rule() {
        let grammar = Grammar::new(
            SectionDecl::new("main")
                .rule(RuleDecl::rule("NUMBER", "[0-9]+", 1))
                .section(
                    SectionDecl::new("child")
                        .inherits()
                        .rule(RuleDecl::rule("WORD", "[a-z]+", 3)),
                ),
        );
        let analyzer = LexicalAnalyzer::compile(&grammar).unwrap();

        assert_eq!(
            analyzer.classify("main.child", "42").unwrap().get_id(),
            Some("NUMBER")
        );
        assert!(analyzer.classify("main", "abc").is_none());
    }

    #[test]
    fn test_local_rules_before_inherited_rules() {
        let grammar = Grammar::new(
            SectionDecl::new("main")
                .rule(RuleDecl::rule("PARENT_WORD", "[a-z]+", 1))
                .section(
                    SectionDecl::new("child")
                        .inherits()
                        .rule(RuleDecl::rule("CHILD_WORD", "[a-z]+", 3)),
                ),
        );
        let analyzer = LexicalAnalyzer::compile(&grammar).unwrap();

        assert_eq!(analyzer.section("main.child").unwrap().get_rules(), &[1, 0]);
        assert_eq!(
            analyzer.classify("main.child", "abc").unwrap().get_id(),
            Some("CHILD_WORD")
        );
        assert_eq!(
            analyzer.classify("main", "abc").unwrap().get_id(),
            Some("PARENT_WORD")
        );
    }

    #[test]
    fn test_unresolved_import_pattern() {
        let grammar = Grammar::new(
            SectionDecl::new("main")
                .rule(RuleDecl::reserve("TOK", 1))
                .section(SectionDecl::new("inner").rule(RuleDecl::import("TOK", 3))),
        );
        let result = LexicalAnalyzer::compile(&grammar);

        assert!(result.is_err());

        let err = result.unwrap_err();

        match err.downcast_ref::<CompileError>() {
            Some(err) => {
                assert_eq!(
                    err.get_error(),
                    &RuleError::UnresolvedPatternError("TOK".to_string())
                );
                assert_eq!(err.get_section(), "main.inner");
                assert_eq!(err.get_line(), 3);
            }
            None => unreachable!(),
        }
    }

    #[test]
    fn test_missing_reservation() {
        let grammar = Grammar::new(SectionDecl::new("main").rule(RuleDecl::import("TOK", 1)));
        let err = LexicalAnalyzer::compile(&grammar).unwrap_err();

        match err.downcast_ref::<CompileError>().map(|err| err.get_error()) {
            Some(RuleError::NameNotFoundError(NameKind::Reservation, name)) => assert_eq!(name, "TOK"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_duplicate_identifier() {
        let grammar = Grammar::new(
            SectionDecl::new("main")
                .rule(RuleDecl::rule("Id", "a", 1))
                .rule(RuleDecl::rule("ID", "b", 2)),
        );
        let err = LexicalAnalyzer::compile(&grammar).unwrap_err();

        match err.downcast_ref::<CompileError>() {
            Some(err) => {
                assert_eq!(
                    err.get_error(),
                    &RuleError::DuplicateIdentifierError {
                        id: "ID".to_string(),
                        previous_line: 1
                    }
                );
                assert_eq!(
                    err.to_string(),
                    "Error: line 2 in section 'main': rule 'ID': identifier 'ID' already declared on line 1"
                );
            }
            None => unreachable!(),
        }
    }

    #[test]
    fn test_deterministic_output() {
        let grammar = Grammar::load(sample_grammar_path()).unwrap();
        let first = serde_json::to_string(&LexicalAnalyzer::compile(&grammar).unwrap()).unwrap();
        let second = serde_json::to_string(&LexicalAnalyzer::compile(&grammar).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sample_grammar() {
        let grammar = Grammar::load(sample_grammar_path()).unwrap();
        let analyzer = LexicalAnalyzer::compile(&grammar).unwrap();

        let names: Vec<&str> = analyzer
            .sections()
            .iter()
            .map(|section| section.get_name())
            .collect();
        assert_eq!(
            names,
            vec!["main", "main.string", "main.comment", "main.block"]
        );
        assert!(analyzer.rule_ids().contains(&"KEYWORD".to_string()));
        assert_eq!(analyzer.reserved_ids(), &["RESERVED_OP".to_string()]);

        // The import only matches in the section declaring it
        assert_eq!(
            analyzer.classify("main.block", "while").unwrap().get_id(),
            Some("KEYWORD")
        );
        assert_eq!(
            analyzer.classify("main", "while").unwrap().get_id(),
            Some("IDENTIFIER")
        );
        assert_eq!(analyzer.classify("main", "iF").unwrap().get_id(), Some("IF"));
    }

    #[test]
    fn test_scan_with_sections() {
        let grammar = Grammar::load(sample_grammar_path()).unwrap();
        let analyzer = LexicalAnalyzer::compile(&grammar).unwrap();
        let scanner = Scanner::new(&analyzer);

        let tokens = scanner
            .scan("IF count1 3.14 \"a\\\"b\" /* note * here */ iffy")
            .unwrap();

        let found: Vec<(Option<&str>, Option<&str>)> = tokens
            .iter()
            .map(|token| (token.get_category(), token.get_lexeme()))
            .collect();
        let expected = vec![
            (Some("IF"), None),
            (Some("IDENTIFIER"), Some("count1")),
            (Some("NUMBER"), Some("3.14")),
            (Some("QUOTE"), None),
            (Some("STRING_TEXT"), Some("a")),
            (Some("STRING_ESCAPE"), Some("\\\"")),
            (Some("STRING_TEXT"), Some("b")),
            (Some("END_QUOTE"), None),
            (Some("IDENTIFIER"), Some("iffy")),
        ];
        assert_eq!(found, expected);
    }

    #[test]
    fn test_scan_file() {
        let grammar = Grammar::load(sample_grammar_path()).unwrap();
        let analyzer = LexicalAnalyzer::compile(&grammar).unwrap();
        let source_file = std::env::temp_dir().join("lexforge_scan_file_input.txt");
        std::fs::write(&source_file, "if total 42\n").unwrap();

        let tokens = Scanner::new(&analyzer).scan_file(&source_file).unwrap();
        let categories: Vec<Option<&str>> = tokens.iter().map(|token| token.get_category()).collect();
        assert_eq!(categories, vec![Some("IF"), Some("IDENTIFIER"), Some("NUMBER")]);
        assert_eq!(tokens[2].get_lexeme(), Some("42"));
        assert_eq!(tokens[2].get_offset(), 9);

        let missing = std::env::temp_dir().join("lexforge_scan_file_missing.txt");
        let _ = std::fs::remove_file(&missing);
        assert!(Scanner::new(&analyzer).scan_file(&missing).is_err());
    }

    #[test]
    fn test_scan_bad_token() {
        let grammar = Grammar::load(sample_grammar_path()).unwrap();
        let analyzer = LexicalAnalyzer::compile(&grammar).unwrap();
        let result = Scanner::new(&analyzer).scan("count = 1");

        assert!(result.is_err());

        let err = result.unwrap_err();

        match err.downcast_ref() {
            Some(ScannerError::BadToken(token, offset)) => {
                assert_eq!(token, "=");
                assert_eq!(*offset, 6);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_emit_builtin_backends() {
        let grammar = Grammar::load(sample_grammar_path()).unwrap();
        let analyzer = LexicalAnalyzer::compile(&grammar).unwrap();
        let registry = BackendRegistry::with_builtins();
        let options = BackendOptions::new(Some("sample".to_string()), None).unwrap();

        let output_dir = std::env::temp_dir().join("lexforge_integration_output");
        let written = registry.emit(Some("dot"), &analyzer, &options, &output_dir).unwrap();
        assert_eq!(written.len(), 4);
        assert!(written.iter().all(|path| path.exists()));

        let written = registry.emit(None, &analyzer, &options, &output_dir).unwrap();
        assert_eq!(written, vec![output_dir.join("sample.json")]);

        let err = registry
            .emit(Some("cobol"), &analyzer, &options, &output_dir)
            .unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }
}
