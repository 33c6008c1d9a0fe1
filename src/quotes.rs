use uuid::Uuid;

pub const QUOTES: &[&str] = &[
    "The secret of getting ahead is getting started.",
    "Well begun is half done.",
    "Small deeds done are better than great deeds planned.",
    "It always seems impossible until it's done.",
    "Do what you can, with what you have, where you are.",
    "Action is the foundational key to all success.",
    "You don't have to see the whole staircase, just take the first step.",
    "Focus on being productive instead of busy.",
    "A goal without a plan is just a wish.",
    "Little by little, one travels far.",
];

/// Picks a quote. `random` receives the number of quotes and returns an
/// index; out-of-range indices wrap around.
pub fn pick_quote(random: impl FnOnce(usize) -> usize) -> &'static str {
    QUOTES[random(QUOTES.len()) % QUOTES.len()]
}

/// `pick_quote` with a random index taken from a fresh v4 UUID.
pub fn random_quote() -> &'static str {
    pick_quote(|len| (Uuid::new_v4().as_u128() % len as u128) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_selects_quote() {
        assert_eq!(pick_quote(|_| 0), QUOTES[0]);
        assert_eq!(pick_quote(|len| len - 1), QUOTES[QUOTES.len() - 1]);
    }

    #[test]
    fn out_of_range_index_wraps() {
        assert_eq!(pick_quote(|len| len + 2), QUOTES[2]);
    }

    #[test]
    fn random_quote_is_from_the_list() {
        assert!(QUOTES.contains(&random_quote()));
    }
}
