/// Match `input` against a glob pattern supporting `*` (any run) and `?` (one char).
pub fn glob_match(pattern: &str, input: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let input: Vec<char> = input.chars().collect();

    let (mut p, mut i) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while i < input.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, i));
                p += 1;
            }
            Some(&c) if c == '?' || c == input[i] => {
                p += 1;
                i += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    i = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_wildcards() {
        assert!(glob_match("room:cleanup", "room:cleanup"));
        assert!(glob_match("chat:*", "chat:123456"));
        assert!(glob_match("__keyspace@0__:Player:*", "__keyspace@0__:Player:abc"));
        assert!(glob_match("Player:abc:*", "Player:abc:Changes"));
        assert!(glob_match("Room:??????", "Room:123456"));
        assert!(!glob_match("Room:??????", "Room:12345"));
        assert!(!glob_match("chat:*", "room:cleanup"));
        assert!(!glob_match("Player:abc:*", "Player:abc"));
    }

    #[test]
    fn star_backtracks() {
        assert!(glob_match("*:Changes", "Room:1:Changes"));
        assert!(glob_match("a*b*c", "aXbYbZc"));
        assert!(!glob_match("a*b*c", "aXbYbZ"));
        assert!(glob_match("*", ""));
    }
}
