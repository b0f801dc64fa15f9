// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the scanner.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;

/// Collect all tokens up to and including EOF.
fn scan_all(source: &str) -> Vec<Token<'_>> {
    let mut scanner = Scanner::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = scanner.scan_token();
        let kind = token.kind;
        tokens.push(token);
        if kind == TokenKind::Eof {
            return tokens;
        }
    }
}

fn kinds(source: &str) -> Vec<TokenKind> {
    scan_all(source).into_iter().map(|t| t.kind).collect()
}

#[test]
fn punctuation_and_operators() {
    assert_eq!(
        kinds("(){};,.-+/*"),
        vec![
            TokenKind::LeftParen,
            TokenKind::RightParen,
            TokenKind::LeftBrace,
            TokenKind::RightBrace,
            TokenKind::Semicolon,
            TokenKind::Comma,
            TokenKind::Dot,
            TokenKind::Minus,
            TokenKind::Plus,
            TokenKind::Slash,
            TokenKind::Star,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn one_and_two_character_operators() {
    assert_eq!(
        kinds("! != = == < <= > >="),
        vec![
            TokenKind::Bang,
            TokenKind::BangEqual,
            TokenKind::Equal,
            TokenKind::EqualEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn keywords_and_identifiers() {
    let tokens = scan_all("var foo = nil; while (true) { print foo; }");
    let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Var,
            TokenKind::Identifier,
            TokenKind::Equal,
            TokenKind::Nil,
            TokenKind::Semicolon,
            TokenKind::While,
            TokenKind::LeftParen,
            TokenKind::True,
            TokenKind::RightParen,
            TokenKind::LeftBrace,
            TokenKind::Print,
            TokenKind::Identifier,
            TokenKind::Semicolon,
            TokenKind::RightBrace,
            TokenKind::Eof,
        ]
    );
    assert_eq!(tokens[1].lexeme, "foo");
}

#[test]
fn underscore_starts_identifiers() {
    let tokens = scan_all("_private superb");
    assert_eq!(tokens[0].kind, TokenKind::Identifier);
    assert_eq!(tokens[0].lexeme, "_private");
    // Keyword prefixes do not make keywords.
    assert_eq!(tokens[1].kind, TokenKind::Identifier);
    assert_eq!(tokens[1].lexeme, "superb");
}

#[test]
fn number_literals() {
    let tokens = scan_all("123 45.67 8.");
    assert_eq!(tokens[0].kind, TokenKind::Number);
    assert_eq!(tokens[0].lexeme, "123");
    assert_eq!(tokens[1].kind, TokenKind::Number);
    assert_eq!(tokens[1].lexeme, "45.67");
    // A trailing dot is not part of the number.
    assert_eq!(tokens[2].kind, TokenKind::Number);
    assert_eq!(tokens[2].lexeme, "8");
    assert_eq!(tokens[3].kind, TokenKind::Dot);
}

#[test]
fn string_literals_keep_quotes_in_lexeme() {
    let tokens = scan_all("\"hi there\"");
    assert_eq!(tokens[0].kind, TokenKind::String);
    assert_eq!(tokens[0].lexeme, "\"hi there\"");
}

#[test]
fn multiline_strings_count_lines() {
    let tokens = scan_all("\"one\ntwo\" x");
    assert_eq!(tokens[0].kind, TokenKind::String);
    assert_eq!(tokens[1].kind, TokenKind::Identifier);
    assert_eq!(tokens[1].line, 2);
}

#[test]
fn unterminated_string_is_an_error_token() {
    let tokens = scan_all("\"oops");
    assert_eq!(tokens[0].kind, TokenKind::Error);
    assert_eq!(tokens[0].lexeme, "Unterminated string.");
}

#[test]
fn unexpected_character_is_an_error_token() {
    let tokens = scan_all("@");
    assert_eq!(tokens[0].kind, TokenKind::Error);
    assert_eq!(tokens[0].lexeme, "Unexpected character.");
}

#[test]
fn comments_and_whitespace_are_skipped() {
    let tokens = scan_all("// nothing here\n  1 // trailing\n2");
    assert_eq!(tokens[0].kind, TokenKind::Number);
    assert_eq!(tokens[0].line, 2);
    assert_eq!(tokens[1].kind, TokenKind::Number);
    assert_eq!(tokens[1].line, 3);
}

#[test]
fn lines_are_tracked() {
    let tokens = scan_all("1\n2\n\n3");
    assert_eq!(tokens[0].line, 1);
    assert_eq!(tokens[1].line, 2);
    assert_eq!(tokens[2].line, 4);
}
