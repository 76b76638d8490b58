//! Search and page window over the coin list

use crate::types::CoinQuote;

/// One window of the coin list
#[derive(Debug, Clone, PartialEq)]
pub struct CoinPage<'a> {
    pub items: Vec<&'a CoinQuote>,
    /// Page actually returned after clamping; 1 while searching
    pub page: usize,
    pub total_pages: usize,
    pub total_matches: usize,
    /// True when a search term was applied and paging suspended
    pub searching: bool,
}

fn matches(quote: &CoinQuote, needle: &str) -> bool {
    quote.name.to_lowercase().contains(needle) || quote.symbol.to_lowercase().contains(needle)
}

/// Returns the coins to display.
///
/// A non-empty search term returns every case-insensitive name or symbol
/// match and ignores `page_number`. Otherwise the page is clamped into
/// `1..=total_pages`.
pub fn page<'a>(
    all: &'a [CoinQuote],
    search: &str,
    page_number: usize,
    page_size: usize,
) -> CoinPage<'a> {
    let needle = search.trim().to_lowercase();

    if !needle.is_empty() {
        let items: Vec<&CoinQuote> = all.iter().filter(|q| matches(q, &needle)).collect();
        return CoinPage {
            total_matches: items.len(),
            items,
            page: 1,
            total_pages: 1,
            searching: true,
        };
    }

    let page_size = page_size.max(1);
    let total_pages = all.len().div_ceil(page_size).max(1);
    let page = page_number.clamp(1, total_pages);

    let start = ((page - 1) * page_size).min(all.len());
    let end = (start + page_size).min(all.len());

    CoinPage {
        items: all[start..end].iter().collect(),
        page,
        total_pages,
        total_matches: all.len(),
        searching: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn coins(n: usize) -> Vec<CoinQuote> {
        (0..n)
            .map(|i| {
                CoinQuote::new(
                    format!("coin-{}", i),
                    format!("Coin {}", i),
                    format!("c{}", i),
                    Decimal::from(i as u64 + 1),
                )
            })
            .collect()
    }

    fn ids(page: &CoinPage<'_>) -> Vec<String> {
        page.items.iter().map(|q| q.id.clone()).collect()
    }

    #[test]
    fn test_last_partial_page() {
        let all = coins(120);
        let result = page(&all, "", 3, 50);

        assert_eq!(result.items.len(), 20);
        assert_eq!(result.items[0].id, "coin-100");
        assert_eq!(result.items[19].id, "coin-119");
        assert_eq!(result.page, 3);
        assert_eq!(result.total_pages, 3);
        assert!(!result.searching);
    }

    #[test]
    fn test_out_of_range_pages_are_clamped() {
        let all = coins(120);

        let low = page(&all, "", 0, 50);
        assert_eq!(low.page, 1);
        assert_eq!(low.items[0].id, "coin-0");

        let high = page(&all, "", 99, 50);
        assert_eq!(high.page, 3);
        assert_eq!(ids(&high), ids(&page(&all, "", 3, 50)));
    }

    #[test]
    fn test_search_ignores_page_number() {
        let mut all = coins(60);
        all.insert(3, CoinQuote::new("bitcoin", "Bitcoin", "BTC", Decimal::from(64000)));
        all.push(CoinQuote::new("wrapped-bitcoin", "Wrapped BTC", "WBTC", Decimal::from(63900)));
        all.push(CoinQuote::new("bittensor", "Bittensor", "TAO", Decimal::from(420)));
        all.push(CoinQuote::new("orbit", "Orbit Chain", "ORC", Decimal::from(1)));

        let first = page(&all, "bit", 1, 50);
        let later = page(&all, "  BIT ", 7, 50);

        assert!(first.searching);
        assert_eq!(
            ids(&first),
            vec!["bitcoin", "bittensor", "orbit"]
        );
        assert_eq!(ids(&first), ids(&later));
        assert_eq!(first.total_matches, 3);
    }

    #[test]
    fn test_search_matches_symbol() {
        let all = vec![
            CoinQuote::new("wrapped-bitcoin", "Wrapped Bitcoin", "WBTC", Decimal::ONE),
            CoinQuote::new("ethereum", "Ethereum", "ETH", Decimal::ONE),
        ];
        assert_eq!(ids(&page(&all, "wbt", 1, 50)), vec!["wrapped-bitcoin"]);
    }

    #[test]
    fn test_empty_list_and_zero_page_size() {
        let empty = page(&[], "", 5, 50);
        assert!(empty.items.is_empty());
        assert_eq!(empty.page, 1);
        assert_eq!(empty.total_pages, 1);

        let all = coins(3);
        let tiny = page(&all, "", 2, 0);
        assert_eq!(ids(&tiny), vec!["coin-1"]);
        assert_eq!(tiny.total_pages, 3);
    }
}
