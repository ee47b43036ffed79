//! Semantic probabilistic grammar of passwords.
//!
//! Passwords arrive segmented into words and non-words, each word carrying a
//! part of speech and possibly a WordNet style sense. The senses are
//! generalized into classes through MDL tree cuts ([`tree`]), the classes and
//! syntactic tags become the grammar's categories ([`grammar`]), and the
//! trained grammar either scores passwords or enumerates every guess it can
//! produce in decreasing probability ([`guesser`]).

#![forbid(unsafe_code)]

pub mod errors;
pub mod estimator;
pub mod grammar;
pub mod guesser;
pub mod tree;
