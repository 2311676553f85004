/// Splits free-text annotations into comparable tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Comma-separated tags: split on `,`, trim, lowercase, drop empties.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommaTokenizer;

impl Tokenizer for CommaTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_trims_and_lowercases() {
        assert_eq!(
            CommaTokenizer.tokenize(" Pizza, soda ,ICE cream"),
            vec!["pizza", "soda", "ice cream"]
        );
    }

    #[test]
    fn drops_empty_segments() {
        assert_eq!(CommaTokenizer.tokenize(",, pizza,  ,"), vec!["pizza"]);
        assert!(CommaTokenizer.tokenize("").is_empty());
        assert!(CommaTokenizer.tokenize(" , ").is_empty());
    }

    #[test]
    fn keeps_duplicates_for_caller_to_dedup() {
        assert_eq!(CommaTokenizer.tokenize("pizza, PIZZA"), vec!["pizza", "pizza"]);
    }
}
