use finscript::lexer::{Keyword, OperatorKind, ReadOrder, Scanner, Token, TokenKind};
use pretty_assertions::assert_eq;

fn scan(source: &str) -> Vec<Token> {
    Scanner::new(source)
        .scan_tokens()
        .unwrap_or_else(|err| panic!("scan of {:?} failed: {}", source, err.message))
}

fn kinds(source: &str) -> Vec<TokenKind> {
    scan(source).into_iter().map(|token| token.kind).collect()
}

fn op(kind: OperatorKind) -> TokenKind {
    TokenKind::Operator(kind)
}

#[test]
fn minus_after_a_value_is_binary() {
    assert_eq!(
        kinds("1-2"),
        vec![TokenKind::Decimal(1.0), op(OperatorKind::Sub), TokenKind::Decimal(2.0)]
    );
    assert_eq!(
        kinds("x - -2"),
        vec![TokenKind::Variable, op(OperatorKind::Sub), TokenKind::Decimal(-2.0)]
    );
}

#[test]
fn leading_minus_is_part_of_the_literal() {
    assert_eq!(kinds("-2"), vec![TokenKind::Decimal(-2.0)]);
    assert_eq!(kinds("+7"), vec![TokenKind::Decimal(7.0)]);
    assert_eq!(kinds("-x"), vec![op(OperatorKind::Sub), TokenKind::Variable]);
}

#[test]
fn bang_depends_on_position() {
    assert_eq!(kinds("x!"), vec![TokenKind::Variable, op(OperatorKind::Factorial)]);
    assert_eq!(kinds("!x"), vec![op(OperatorKind::LogicNot), TokenKind::Variable]);
    assert_eq!(
        kinds("3!!"),
        vec![TokenKind::Decimal(3.0), op(OperatorKind::Factorial), op(OperatorKind::Factorial)]
    );
}

#[test]
fn two_character_operators_win() {
    assert_eq!(
        kinds("a<>b"),
        vec![TokenKind::Variable, op(OperatorKind::NotEqual), TokenKind::Variable]
    );
    assert_eq!(
        kinds("a<=b"),
        vec![TokenKind::Variable, op(OperatorKind::LessEqual), TokenKind::Variable]
    );
    assert_eq!(
        kinds("a$$b"),
        vec![TokenKind::Variable, op(OperatorKind::BitXor), TokenKind::Variable]
    );
    assert_eq!(
        kinds("a^^b"),
        vec![TokenKind::Variable, op(OperatorKind::LogicXor), TokenKind::Variable]
    );
    assert_eq!(kinds("~~a"), vec![op(OperatorKind::LogicNot), TokenKind::Variable]);
}

#[test]
fn keywords_and_identifiers() {
    assert_eq!(
        kinds("var while_ x2 if"),
        vec![
            TokenKind::Keyword(Keyword::Var),
            TokenKind::Variable,
            TokenKind::Variable,
            TokenKind::Keyword(Keyword::If),
        ]
    );
    assert_eq!(Keyword::from_ident("goto"), Some(Keyword::Goto));
    assert_eq!(Keyword::from_ident("Goto"), None);
}

#[test]
fn number_forms() {
    assert_eq!(kinds("1e3"), vec![TokenKind::Decimal(1000.0)]);
    assert_eq!(kinds("2.5e-1"), vec![TokenKind::Decimal(0.25)]);
    assert_eq!(kinds(".5"), vec![TokenKind::Decimal(0.5)]);
    assert_eq!(kinds("3."), vec![TokenKind::Decimal(3.0)]);
}

#[test]
fn dangling_exponent_starts_a_new_token() {
    let tokens = scan("2e");
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].kind, TokenKind::Decimal(2.0));
    assert_eq!(tokens[1].kind, TokenKind::Variable);
    assert_eq!(tokens[1].text, "e");
}

#[test]
fn strings_are_unescaped() {
    assert_eq!(kinds(r#""a\"b\n""#), vec![TokenKind::String("a\"b\n".to_string())]);
    assert_eq!(kinds(r#""""#), vec![TokenKind::String(String::new())]);
}

#[test]
fn unterminated_string_is_reported() {
    let mut scanner = Scanner::new("\"abc");
    let tokens = scanner.scan_tokens().unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::String("abc".to_string()));

    let diagnostics = scanner.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "Unterminated string");
    assert!(scanner.take_diagnostics().is_empty());
}

#[test]
fn comments_become_tokens() {
    let tokens = scan("// note\nx /* block */ 1");
    assert_eq!(tokens[0].kind, TokenKind::Comment);
    assert_eq!(tokens[0].text, "// note");
    assert_eq!(tokens[1].kind, TokenKind::Variable);
    assert_eq!(tokens[2].kind, TokenKind::Comment);
    assert_eq!(tokens[2].text, "/* block */");
    assert_eq!(tokens[3].kind, TokenKind::Decimal(1.0));
}

#[test]
fn unterminated_block_comment_fails() {
    let err = Scanner::new("x /* open").scan_tokens().unwrap_err();
    assert_eq!(err.message, "Unterminated block comment");
    assert_eq!((err.row, err.column), (1, 3));
}

#[test]
fn unexpected_character_fails() {
    let err = Scanner::new("a @ b").scan_tokens().unwrap_err();
    assert_eq!(err.message, "Unexpected character: '@'");
    assert_eq!(err.column, 3);
}

#[test]
fn positions_track_rows_and_columns() {
    let tokens = scan("a\n  b");
    assert_eq!((tokens[0].row, tokens[0].column), (1, 1));
    assert_eq!((tokens[1].row, tokens[1].column), (2, 3));
    assert_eq!(tokens[1].span.start, 4);
}

#[test]
fn read_order_follows_the_last_token() {
    let mut scanner = Scanner::new("x + (");
    assert_eq!(scanner.read_order(), ReadOrder::NumberFirst);
    scanner.next_token().unwrap();
    assert_eq!(scanner.read_order(), ReadOrder::OperatorFirst);
    scanner.next_token().unwrap();
    assert_eq!(scanner.read_order(), ReadOrder::NumberFirst);
    scanner.next_token().unwrap();
    assert_eq!(scanner.read_order(), ReadOrder::NumberFirst);
    assert_eq!(scanner.next_token().unwrap(), None);
}
