// Parser robustness tests for FIN-script
//
// Each group is a table of scripts that must either build a clean syntax
// tree or be rejected, optionally with a specific first diagnostic.

use finscript::error::Diagnostic;
use finscript::parser;
use std::panic;

#[derive(Debug, Clone, Copy)]
enum Expect {
    Clean,
    Rejected(Option<&'static str>),
}

#[derive(Debug, Clone, Copy)]
struct Case {
    name: &'static str,
    source: &'static str,
    expect: Expect,
}

const fn clean(name: &'static str, source: &'static str) -> Case {
    Case { name, source, expect: Expect::Clean }
}

const fn rejected(name: &'static str, source: &'static str) -> Case {
    Case { name, source, expect: Expect::Rejected(None) }
}

const fn rejected_with(name: &'static str, source: &'static str, message: &'static str) -> Case {
    Case { name, source, expect: Expect::Rejected(Some(message)) }
}

#[derive(Debug)]
enum Verdict {
    Pass,
    Fail(String),
    Crash(String),
}

/// First diagnostic of the parse, if any.
fn first_diagnostic(source: &str) -> Option<Diagnostic> {
    parser::parse(source).errors().first().cloned()
}

fn judge(source: &str, expect: Expect) -> Verdict {
    let owned = source.to_string();
    let diagnostic = match panic::catch_unwind(move || first_diagnostic(&owned)) {
        Ok(diagnostic) => diagnostic,
        Err(payload) => {
            let message = payload
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                .unwrap_or_else(|| "unknown panic".to_string());
            return Verdict::Crash(message);
        }
    };

    match (expect, diagnostic) {
        (Expect::Clean, None) => Verdict::Pass,
        (Expect::Clean, Some(d)) => Verdict::Fail(format!(
            "expected a clean tree, got {}:{} {}",
            d.row, d.column, d.message
        )),
        (Expect::Rejected(_), None) => Verdict::Fail("expected a diagnostic, parse was clean".to_string()),
        (Expect::Rejected(Some(wanted)), Some(d)) if !d.message.contains(wanted) => {
            Verdict::Fail(format!("diagnostic '{}' does not mention '{}'", d.message, wanted))
        }
        (Expect::Rejected(_), Some(_)) => Verdict::Pass,
    }
}

/// Run one group, print a line per case, and return the names that did not pass.
fn run_group(title: &str, cases: &[Case]) -> Vec<String> {
    println!("{}", title);
    let mut bad = Vec::new();
    for case in cases {
        match judge(case.source, case.expect) {
            Verdict::Pass => println!("  ok    {}", case.name),
            Verdict::Fail(why) => {
                println!("  FAIL  {}: {}", case.name, why);
                bad.push(format!("{}/{}", title, case.name));
            }
            Verdict::Crash(why) => {
                println!("  PANIC {}: {}", case.name, why);
                bad.push(format!("{}/{} (panic)", title, case.name));
            }
        }
    }
    println!("  {} of {} passed\n", cases.len() - bad.len(), cases.len());
    bad
}

const BRACKETS: &[Case] = &[
    rejected_with("unmatched_opening_paren", "(1 + 2", "Unclosed '('"),
    rejected_with("unmatched_opening_paren_nested", "((1 + 2)", "Unclosed '('"),
    rejected_with("unmatched_closing_paren", "1 + 2)", "Unmatched ')'"),
    rejected_with("unmatched_closing_paren_multiple", "1 + 2))", "Unmatched ')'"),
    // An empty group is a Null value, not an error
    clean("empty_parentheses", "()"),
    clean("empty_parentheses_in_expression", "1 + ()"),
    rejected_with("unmatched_opening_bracket", "[1, 2", "Unclosed '['"),
    rejected_with("unmatched_opening_brace", "{ x = 1", "Unclosed '{'"),
    rejected_with("unmatched_closing_brace", "x = 1 }", "Unmatched '}'"),
    rejected("mismatched_brackets", "x = [1 + (2 * 3]"),
    rejected("mismatched_close", "x = (1]"),
];

const EDGES: &[Case] = &[
    clean("empty_input", ""),
    clean("only_whitespace", "   \n\t  "),
    clean("only_comments", "// nothing\n/* here */"),
    rejected_with("unterminated_block_comment", "1; /* open", "Unterminated block comment"),
    rejected_with("eof_after_operator", "1 +", "Expected expression after '+'"),
    rejected("eof_inside_group", "1 + ("),
    rejected_with("unknown_character", "1 # 2", "Unexpected character"),
];

const OPERATORS: &[Case] = &[
    // A missing left operand turns + and - into their unary forms
    clean("unary_plus", "+ 1"),
    clean("unary_minus_after_binary", "1 +- 2"),
    rejected("lone_operator", "+"),
    rejected_with("missing_left_operand", "* 2", "Missing left operand"),
    // `1 ++ 2` is a postfix increment followed by a stray value
    rejected_with("double_plus", "1 ++ 2", "Expected operator before '2'"),
    rejected("double_minus", "1 -- 2"),
    rejected_with("adjacent_values", "1 2", "Expected operator"),
    clean("not_equal_alias", "1 <> 2"),
    clean("greater_equal", "1 >= 2"),
    clean("power_chain", "2 ^ 3 ^ 2"),
    clean("logic_operators", "1 && 0 || 1 ^^ 0"),
    clean("bit_operators", "~5 & 3 | 4 $$ 1"),
    clean("logic_not_forms", "!0 + ~~1"),
    clean("factorial", "5! + -3!"),
    rejected("keyword_in_expression", "1 + var x"),
    rejected_with("keyword_after_value", "x var", "Unexpected keyword 'var'"),
];

const CONTROL_FLOW: &[Case] = &[
    clean("if_block", "if (1) { x = 1; }"),
    clean("if_without_final_semicolon", "if (1) { x = 1 }"),
    clean("if_elif_else", "if (a) { 1; } elif (b) { 2; } else { 3; }"),
    rejected("if_missing_condition", "if { x = 1 }"),
    rejected_with("if_missing_body", "if (1)", "Expected '{' block"),
    rejected_with("else_without_if", "else { 1; }", "'else' without a matching 'if'"),
    rejected_with(
        "elif_after_else",
        "if (1) { 1; } else { 2; } elif (3) { 3; }",
        "'elif' without a matching 'if'",
    ),
    clean("while_block", "while (1) { x = 1; }"),
    rejected("while_missing_condition", "while { x = 1 }"),
    rejected("while_missing_body", "while (1)"),
    clean("for_block", "for (i = 0; i < 10; i++) { print(i); }"),
    clean("for_with_declaration", "for (var i = 0; i < 10; i++) { }"),
    clean("for_with_empty_parts", "for (;;) { break; }"),
    rejected("for_missing_semicolon", "for (i = 0 i < 10; i = i + 1) { print(i); }"),
    rejected_with("for_with_two_parts", "for (i = 0; i < 10) { }", "'for' needs"),
    clean("labels_and_goto", "start: x++; goto start;"),
    rejected_with("goto_without_label", "goto;", "Expected a label name"),
    clean("return_and_exit", "return 1; exit;"),
    rejected_with("break_with_value", "break 1;", "Unexpected expression after 'break'"),
];

const LITERALS: &[Case] = &[
    clean("integer", "42"),
    clean("decimal", "3.14"),
    clean("exponent", "1.5e2"),
    clean("string", "\"hello\""),
    clean("escaped_string", "\"a\\\"b\\n\""),
    clean("trailing_dot", "42."),
    clean("leading_dot", ".42"),
    rejected("multiple_dots", "3.14.159"),
    rejected_with("unterminated_string", "\"hello", "Unterminated string"),
    rejected_with("unterminated_string_with_newline", "\"hello\nworld", "Unterminated string"),
];

const FUNCTIONS: &[Case] = &[
    clean("call_without_args", "foo()"),
    clean("call_with_args", "foo(1, 2, 3)"),
    clean("empty_argument_slot", "foo(1, , 3)"),
    clean("trailing_comma", "foo(1, 2,)"),
    clean("nested_calls", "foo(bar(1), [2, 3][0])"),
    rejected("missing_closing_paren", "foo(1, 2"),
    rejected("missing_opening_paren", "foo 1, 2)"),
    clean("definition", "add(a, b) { return a + b; }"),
    clean("definition_without_params", "f() { }"),
    rejected_with("definition_with_literal_param", "f(1) { }", "Function parameters must be plain names"),
    rejected_with("index_with_two_expressions", "a[1, 2]", "exactly one expression"),
];

const ASSIGNMENTS: &[Case] = &[
    clean("assignment", "x = 1"),
    clean("assignment_with_expression", "x = 1 + 2"),
    clean("chained_assignment", "x = y = 3"),
    clean("declaration_list", "var a, b = 2, c;"),
    rejected("missing_value", "x ="),
    rejected_with("declare_nothing", "var;", "Expected a variable name"),
    rejected_with("declare_literal", "var 1;", "Expected a variable name"),
    // Left-values are checked when the assignment runs
    clean("literal_target", "1 = x"),
];

const PROGRAMS: &[Case] = &[
    clean("arithmetic", "1 + 2 * 3"),
    clean("grouping", "(1 + 2) * 3"),
    clean("concatenation", "\"hello\" + \" world\""),
    clean("array_literal", "[1, \"two\", [3]]"),
    clean("increment_forms", "x++; ++x; x--; --x;"),
    clean(
        "summation",
        "var total = 0;\nsum(n) {\n  var s = 0;\n  for (var i = 1; i <= n; i++) { s = s + i; }\n  return s;\n}\ntotal = sum(10);\n",
    ),
];

#[test]
fn parser_robustness() {
    let groups: &[(&str, &[Case])] = &[
        ("brackets", BRACKETS),
        ("edge cases", EDGES),
        ("operators", OPERATORS),
        ("control flow", CONTROL_FLOW),
        ("literals", LITERALS),
        ("functions", FUNCTIONS),
        ("assignments", ASSIGNMENTS),
        ("programs", PROGRAMS),
    ];

    let failures: Vec<String> = groups
        .iter()
        .flat_map(|(title, cases)| run_group(title, cases))
        .collect();

    assert!(failures.is_empty(), "cases that did not pass: {:#?}", failures);
}

#[test]
fn deeply_nested_groups_parse() {
    let source = "(".repeat(100) + "1" + &")".repeat(100);
    assert!(matches!(judge(&source, Expect::Clean), Verdict::Pass));
}

#[test]
fn long_argument_lists_parse() {
    let source = "print(1".to_string() + &",1".repeat(20_000) + ");";
    let tree = parser::parse(&source);
    assert!(tree.errors().is_empty(), "{:?}", tree.errors().first());
    drop(tree);

    let chain = "x = 1".to_string() + &" + 1".repeat(50_000) + ";";
    assert!(matches!(judge(&chain, Expect::Clean), Verdict::Pass));
}
