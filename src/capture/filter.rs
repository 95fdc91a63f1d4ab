//! Capture filter expressions.
//!
//! A subset of the tcpdump filter language:
//!
//! ```text
//! ip, ip6, udp, tcp
//! [src|dst] host ADDR
//! [src|dst] port N
//! [src|dst] portrange A-B
//! [src|dst] net ADDR/LEN
//! less N, greater N
//! not EXPR, ! EXPR, EXPR and EXPR, EXPR && EXPR, EXPR or EXPR, EXPR || EXPR, ( EXPR )
//! ```
//!
//! `not` binds tightest. `and` and `or` have the same precedence and associate
//! to the left, as in tcpdump.

use std::fmt;
use std::net::IpAddr;

use combine::error::*;
use combine::parser::char::*;
use combine::stream::StreamErrorFor;
use combine::*;
use combine::{ParseError, Parser, Stream};
use thiserror::Error;

use super::link::{IPPROTO_TCP, IPPROTO_UDP};
use super::PacketInfo;

/// Errors compiling a filter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The expression (first) could not be parsed, with reason (second).
    #[error("Couldn't parse filter {0}: {1}")]
    Syntax(String, String),
}

/// A compiled filter. The default filter matches every frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    text: String,
    expr: Option<Expr>,
}

impl Filter {
    pub fn compile(text: &str) -> Result<Filter, FilterError> {
        if text.trim().is_empty() {
            return Ok(Filter::default());
        }

        let expr = (spaces(), expr(), eof())
            .map(|(_, e, _)| e)
            .easy_parse(text)
            .map(|(e, _)| e)
            .map_err(|e| {
                let e = e.map_position(|p| p.translate_position(text));
                FilterError::Syntax(text.to_string(), e.to_string())
            })?;

        Ok(Filter {
            text: text.to_string(),
            expr: Some(expr),
        })
    }

    pub fn is_match_all(&self) -> bool {
        self.expr.is_none()
    }

    pub fn matches(&self, info: &PacketInfo) -> bool {
        match &self.expr {
            Some(e) => e.matches(info),
            None => true,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.expr.is_none() {
            write!(f, "(match all)")
        } else {
            write!(f, "{}", self.text)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Prim(Prim),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prim {
    Ip,
    Ip6,
    Udp,
    Tcp,
    Qualified(Dir, Target),
    Less(usize),
    Greater(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Src,
    Dst,
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Host(IpAddr),
    Ports(u16, u16),
    Net(IpAddr, u8),
}

#[derive(Debug, Clone, Copy)]
enum Op {
    And,
    Or,
}

impl Expr {
    fn matches(&self, info: &PacketInfo) -> bool {
        match self {
            Expr::Prim(p) => p.matches(info),
            Expr::Not(e) => !e.matches(info),
            Expr::And(a, b) => a.matches(info) && b.matches(info),
            Expr::Or(a, b) => a.matches(info) || b.matches(info),
        }
    }
}

impl Prim {
    fn matches(&self, info: &PacketInfo) -> bool {
        match self {
            Prim::Ip => info.is_ipv4(),
            Prim::Ip6 => info.is_ipv6(),
            Prim::Udp => info.protocol() == Some(IPPROTO_UDP),
            Prim::Tcp => info.protocol() == Some(IPPROTO_TCP),
            Prim::Less(n) => info.len <= *n,
            Prim::Greater(n) => info.len >= *n,
            Prim::Qualified(dir, Target::Host(addr)) => info
                .ip
                .map(|ip| dir.test(ip.src, ip.dst, |a| a == *addr))
                .unwrap_or(false),
            Prim::Qualified(dir, Target::Net(net, len)) => info
                .ip
                .map(|ip| dir.test(ip.src, ip.dst, |a| in_net(a, *net, *len)))
                .unwrap_or(false),
            Prim::Qualified(dir, Target::Ports(lo, hi)) => info
                .ports()
                .map(|(src, dst)| dir.test(src, dst, |p| (*lo..=*hi).contains(&p)))
                .unwrap_or(false),
        }
    }
}

impl Dir {
    fn test<T: Copy>(self, src: T, dst: T, f: impl Fn(T) -> bool) -> bool {
        match self {
            Dir::Src => f(src),
            Dir::Dst => f(dst),
            Dir::Either => f(src) || f(dst),
        }
    }
}

fn in_net(addr: IpAddr, net: IpAddr, len: u8) -> bool {
    match (addr, net) {
        (IpAddr::V4(a), IpAddr::V4(n)) => {
            let mask = u32::MAX.checked_shl(32 - len as u32).unwrap_or(0);
            u32::from(a) & mask == u32::from(n) & mask
        }
        (IpAddr::V6(a), IpAddr::V6(n)) => {
            let mask = u128::MAX.checked_shl(128 - len as u32).unwrap_or(0);
            u128::from(a) & mask == u128::from(n) & mask
        }
        _ => false,
    }
}

fn expr_<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let op = choice((
        keyword("and").map(|_| Op::And),
        symbol("&&").map(|_| Op::And),
        keyword("or").map(|_| Op::Or),
        symbol("||").map(|_| Op::Or),
    ));

    (unary(), many::<Vec<_>, _, _>((op, unary()))).map(|(first, rest)| {
        rest.into_iter().fold(first, |acc, (op, e)| match op {
            Op::And => Expr::And(Box::new(acc), Box::new(e)),
            Op::Or => Expr::Or(Box::new(acc), Box::new(e)),
        })
    })
}

// `parser!` breaks the recursion through parenthesized expressions.
combine::parser! {
    fn expr[Input]()(Input) -> Expr
    where [Input: Stream<Token = char>]
    {
        expr_()
    }
}

/// Any number of negations followed by a primitive or parenthesized expression.
fn unary<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let not = choice((keyword("not"), symbol("!")));

    let paren = between(symbol("("), symbol(")"), expr());

    let atom = choice((paren, primitive()));

    (many::<Vec<_>, _, _>(not), atom).map(|(nots, e)| {
        nots.into_iter()
            .fold(e, |acc, _: ()| Expr::Not(Box::new(acc)))
    })
}

/// A primitive. `udp`/`tcp` may qualify a following host, port or net
/// primitive, as in `udp dst port 5004`.
fn primitive<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let dir = || {
        optional(choice((
            keyword::<Input>("src").map(|_| Dir::Src),
            keyword("dst").map(|_| Dir::Dst),
        )))
        .map(|d| d.unwrap_or(Dir::Either))
    };

    let host = || keyword::<Input>("host").with(ip_addr()).map(Target::Host);

    let portrange = || {
        keyword::<Input>("portrange")
            .with((number::<Input, u16>(), symbol("-"), number::<Input, u16>()))
            .map(|(a, _, b)| Target::Ports(a.min(b), a.max(b)))
    };

    let port = || {
        keyword::<Input>("port")
            .with(number::<Input, u16>())
            .map(|p| Target::Ports(p, p))
    };

    let net = || {
        keyword::<Input>("net")
            .with((ip_addr(), optional(symbol("/").with(number::<Input, u8>()))))
            .and_then(|(addr, len)| {
                let max = if addr.is_ipv4() { 32 } else { 128 };
                let len = len.unwrap_or(max);
                if len > max {
                    return Err(StreamErrorFor::<Input>::message_static_message(
                        "net mask length too long",
                    ));
                }
                Ok(Target::Net(addr, len))
            })
    };

    let qualified = || {
        (dir(), choice((host(), portrange(), port(), net())))
            .map(|(d, t)| Prim::Qualified(d, t))
    };

    let proto = choice((
        keyword("udp").map(|_| Prim::Udp),
        keyword("tcp").map(|_| Prim::Tcp),
    ));

    let proto_qualified = (proto, optional(qualified())).map(|(p, q)| match q {
        Some(q) => Expr::And(Box::new(Expr::Prim(p)), Box::new(Expr::Prim(q))),
        None => Expr::Prim(p),
    });

    choice((
        keyword("ip6").map(|_| Expr::Prim(Prim::Ip6)),
        keyword("ip").map(|_| Expr::Prim(Prim::Ip)),
        proto_qualified,
        keyword("less").with(number()).map(|n| Expr::Prim(Prim::Less(n))),
        keyword("greater").with(number()).map(|n| Expr::Prim(Prim::Greater(n))),
        qualified().map(Expr::Prim),
    ))
}

/// A word that is not the prefix of a longer word.
fn keyword<Input>(word: &'static str) -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    attempt(string(word).skip(not_followed_by(alpha_num())))
        .skip(spaces())
        .map(|_| ())
}

fn symbol<Input>(s: &'static str) -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    attempt(string(s)).skip(spaces()).map(|_| ())
}

fn number<Input, T>() -> impl Parser<Input, Output = T>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    from_str(many1::<String, _, _>(digit())).skip(spaces())
}

fn ip_addr<Input>() -> impl Parser<Input, Output = IpAddr>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(satisfy(|c: char| c.is_ascii_hexdigit() || c == '.' || c == ':'))
        .and_then(|s: String| {
            s.parse::<IpAddr>()
                .map_err(StreamErrorFor::<Input>::message_format)
        })
        .skip(spaces())
}
