//! Text rendering of decoder tokens.

use crate::pipeline::types::Token;

/// Printable form of a token.
///
/// Dits and dahs print as `.` and `_`, boundaries as spacing, and
/// intra-character gaps print nothing.
pub fn render_token(token: Token) -> &'static str {
    match token {
        Token::Dit => ".",
        Token::Dah => "_",
        Token::EndLetter => " ",
        Token::EndWord => " : ",
        Token::Pause => " pause ",
        Token::NoOp => "",
        Token::Error => " ERROR ",
    }
}

/// Renders a token sequence as one string.
pub fn render_tokens<'a, I>(tokens: I) -> String
where
    I: IntoIterator<Item = &'a Token>,
{
    tokens.into_iter().map(|&t| render_token(t)).collect()
}
