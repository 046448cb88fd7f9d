// SPDX-License-Identifier: Apache-2.0
//! Canonical per-digit amount decomposition.

/// Split `amount` into canonical denominations: one `d * 10^k` summand per
/// non-zero decimal digit, with the low places that together stay at or below
/// `dust_threshold` folded into a single dust summand.
///
/// The result is ordered low place to high place and always sums back to
/// `amount`.
pub fn decompose_amount(amount: u64, dust_threshold: u64) -> Vec<u64> {
    let mut decomposed = Vec::new();

    let mut dust = 0u64;
    let mut dust_handled = false;
    let mut order = 1u64;
    let mut rest = amount;

    while rest != 0 {
        let chunk = (rest % 10) * order;
        rest /= 10;
        order = order.saturating_mul(10);

        if !dust_handled && dust + chunk <= dust_threshold {
            dust += chunk;
        } else {
            if !dust_handled && dust != 0 {
                decomposed.push(dust);
                dust_handled = true;
            }
            if chunk != 0 {
                decomposed.push(chunk);
            }
        }
    }

    if !dust_handled && dust != 0 {
        decomposed.push(dust);
    }

    decomposed
}

/// True iff `amount` is a single canonical denomination `d * 10^k` with
/// `1 <= d <= 9`. Returns the power `k`.
pub fn canonical_power_of_ten(amount: u64) -> Option<u8> {
    if amount == 0 {
        return None;
    }

    let mut rest = amount;
    let mut power = 0u8;
    while rest % 10 == 0 {
        rest /= 10;
        power += 1;
    }

    (rest < 10).then_some(power)
}
