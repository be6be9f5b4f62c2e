//! Prime sizing for Maglev lookup tables.

/// Returns the smallest prime greater than or equal to `n`.
///
/// Table sizes stay in the thousands to low millions, so trial division up
/// to the square root of each candidate is fast enough.
pub fn next_prime(n: usize) -> usize {
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

/// Trial-division primality test.
pub fn is_prime(n: usize) -> bool {
    match n {
        0 | 1 => false,
        2 | 3 => true,
        _ if n % 2 == 0 || n % 3 == 0 => false,
        _ => {
            // All primes above 3 are of the form 6k ± 1.
            let mut divisor = 5usize;
            while divisor.saturating_mul(divisor) <= n {
                if n % divisor == 0 || n % (divisor + 2) == 0 {
                    return false;
                }
                divisor += 6;
            }
            true
        }
    }
}
