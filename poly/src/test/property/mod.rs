//! Property-based tests comparing symbolic counts with enumeration.
