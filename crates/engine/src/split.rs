//! Bill split engine.
//!
//! Turns an itemized receipt plus per-participant item claims into exact
//! obligations in integer cents. Tax and tip are shared in proportion to
//! each participant's claimed subtotal:
//!
//! `owed = base + (tax + tip) * base / subtotal`
//!
//! An item may be claimed by several participants. Its price is then divided
//! evenly between them, odd cents going first to the remainder recipient and
//! then to the claimants in input order, so `base` counts each participant's
//! portion of a shared item.
//!
//! The proportional part is floored per participant and the leftover cents
//! are handed out one at a time by largest fractional remainder, so that a
//! claim set covering every item sums exactly to the bill total. Ties go to
//! the designated remainder recipient (usually the bill creator), then to
//! input order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

/// A receipt line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: u32,
    pub name: String,
    pub price_minor: i64,
}

impl LineItem {
    pub fn new(id: u32, name: impl Into<String>, price_minor: i64) -> Self {
        Self {
            id,
            name: name.into(),
            price_minor,
        }
    }
}

/// The items a participant declares as theirs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub participant: String,
    pub item_ids: Vec<u32>,
}

impl Claim {
    pub fn new(participant: impl Into<String>, item_ids: Vec<u32>) -> Self {
        Self {
            participant: participant.into(),
            item_ids,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Obligation {
    pub participant: String,
    pub item_ids: Vec<u32>,
    /// Sum of the claimed item prices.
    pub base_minor: i64,
    /// Share of tax and tip.
    pub extra_minor: i64,
    pub owed_minor: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitPlan {
    pub subtotal_minor: i64,
    pub tax_minor: i64,
    pub tip_minor: i64,
    pub total_minor: i64,
    pub obligations: Vec<Obligation>,
}

impl SplitPlan {
    /// Sum of all obligations. Equals `total_minor` when every item is
    /// claimed.
    pub fn owed_minor(&self) -> i64 {
        self.obligations.iter().map(|o| o.owed_minor).sum()
    }

    /// Item ids nobody claimed.
    pub fn unclaimed_items<'a>(&self, items: &'a [LineItem]) -> Vec<&'a LineItem> {
        let claimed: HashSet<u32> = self
            .obligations
            .iter()
            .flat_map(|o| o.item_ids.iter().copied())
            .collect();
        items.iter().filter(|i| !claimed.contains(&i.id)).collect()
    }
}

/// Computes per-participant obligations.
///
/// Unclaimed items count toward the subtotal but toward nobody's base, so
/// the obligations then sum to less than the total.
pub fn split_bill(
    items: &[LineItem],
    tax_minor: i64,
    tip_minor: i64,
    claims: &[Claim],
    remainder_to: Option<&str>,
) -> ResultEngine<SplitPlan> {
    if tax_minor < 0 || tip_minor < 0 {
        return Err(EngineError::InvalidAmount(
            "tax and tip must be >= 0".to_string(),
        ));
    }

    let mut prices: HashMap<u32, i64> = HashMap::with_capacity(items.len());
    let mut subtotal_minor: i64 = 0;
    for item in items {
        if item.price_minor < 0 {
            return Err(EngineError::InvalidAmount(format!(
                "item {} has a negative price",
                item.id
            )));
        }
        if prices.insert(item.id, item.price_minor).is_some() {
            return Err(EngineError::Validation(format!(
                "duplicate item id {}",
                item.id
            )));
        }
        subtotal_minor = subtotal_minor
            .checked_add(item.price_minor)
            .ok_or_else(|| EngineError::InvalidAmount("subtotal too large".to_string()))?;
    }

    let extra_minor = tax_minor
        .checked_add(tip_minor)
        .ok_or_else(|| EngineError::InvalidAmount("tax and tip too large".to_string()))?;
    let total_minor = subtotal_minor
        .checked_add(extra_minor)
        .ok_or_else(|| EngineError::InvalidAmount("total too large".to_string()))?;

    let mut seen_participants = HashSet::with_capacity(claims.len());
    let mut claimants: HashMap<u32, Vec<usize>> = HashMap::new();
    for (idx, claim) in claims.iter().enumerate() {
        if !seen_participants.insert(claim.participant.as_str()) {
            return Err(EngineError::Validation(format!(
                "participant {} listed twice",
                claim.participant
            )));
        }
        let mut own = HashSet::with_capacity(claim.item_ids.len());
        for item_id in &claim.item_ids {
            if !prices.contains_key(item_id) {
                return Err(EngineError::ItemNotFound(format!("item {item_id}")));
            }
            if !own.insert(*item_id) {
                return Err(EngineError::Validation(format!(
                    "{} claims item {item_id} twice",
                    claim.participant
                )));
            }
            claimants.entry(*item_id).or_default().push(idx);
        }
    }

    let mut bases = vec![0i64; claims.len()];
    for item in items {
        let Some(holders) = claimants.get_mut(&item.id) else {
            continue;
        };
        if let Some(pos) = holders
            .iter()
            .position(|&i| remainder_to == Some(claims[i].participant.as_str()))
        {
            let preferred = holders.remove(pos);
            holders.insert(0, preferred);
        }
        for (&idx, portion) in holders
            .iter()
            .zip(split_evenly(item.price_minor, holders.len()))
        {
            bases[idx] += portion;
        }
    }

    let extras = if subtotal_minor == 0 {
        if extra_minor > 0 {
            return Err(EngineError::DivisionUndefined);
        }
        vec![0; claims.len()]
    } else {
        apportion_extra(extra_minor, subtotal_minor, &bases, claims, remainder_to)
    };

    let obligations = claims
        .iter()
        .zip(bases.iter().zip(extras))
        .map(|(claim, (&base_minor, extra_minor))| Obligation {
            participant: claim.participant.clone(),
            item_ids: claim.item_ids.clone(),
            base_minor,
            extra_minor,
            owed_minor: base_minor + extra_minor,
        })
        .collect();

    Ok(SplitPlan {
        subtotal_minor,
        tax_minor,
        tip_minor,
        total_minor,
        obligations,
    })
}

/// Splits `amount` into `parts` near-equal shares that sum to `amount`; the
/// first `amount % parts` shares carry one extra cent.
pub fn split_evenly(amount_minor: i64, parts: usize) -> Vec<i64> {
    let Ok(n) = i64::try_from(parts) else {
        return Vec::new();
    };
    if n == 0 {
        return Vec::new();
    }
    let base = amount_minor / n;
    let remainder = amount_minor % n;
    (0..n).map(|i| base + i64::from(i < remainder)).collect()
}

/// Largest-remainder apportionment of `extra` proportional to `bases`.
fn apportion_extra(
    extra: i64,
    subtotal: i64,
    bases: &[i64],
    claims: &[Claim],
    remainder_to: Option<&str>,
) -> Vec<i64> {
    let extra = i128::from(extra);
    let subtotal = i128::from(subtotal);

    let mut shares = Vec::with_capacity(bases.len());
    let mut remainders = Vec::with_capacity(bases.len());
    for &base in bases {
        let numerator = extra * i128::from(base);
        shares.push(numerator / subtotal);
        remainders.push(numerator % subtotal);
    }

    let claimed: i128 = bases.iter().map(|b| i128::from(*b)).sum();
    let target = extra * claimed / subtotal;
    let leftover = target - shares.iter().sum::<i128>();

    let mut order: Vec<usize> = (0..bases.len()).collect();
    order.sort_by(|&a, &b| {
        let preferred = |i: usize| remainder_to == Some(claims[i].participant.as_str());
        remainders[b]
            .cmp(&remainders[a])
            .then_with(|| preferred(b).cmp(&preferred(a)))
            .then_with(|| a.cmp(&b))
    });
    for &idx in order.iter().take(leftover.max(0) as usize) {
        shares[idx] += 1;
    }

    // Each share is bounded by `extra`, which is an i64.
    shares.into_iter().map(|s| s as i64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> Vec<LineItem> {
        vec![
            LineItem::new(1, "Burger", 18_99),
            LineItem::new(2, "Salad", 14_50),
            LineItem::new(3, "Fries", 5_99),
            LineItem::new(4, "Steak", 33_02),
        ]
    }

    #[test]
    fn full_partition_sums_to_total() {
        let items = receipt();
        let claims = vec![
            Claim::new("alice", vec![1, 3]),
            Claim::new("bob", vec![2]),
            Claim::new("carol", vec![4]),
        ];
        let plan = split_bill(&items, 6_16, 13_05, &claims, Some("alice")).unwrap();

        assert_eq!(plan.subtotal_minor, 72_50);
        assert_eq!(plan.total_minor, 91_71);
        assert_eq!(plan.owed_minor(), plan.total_minor);
    }

    #[test]
    fn proportional_share_matches_formula_within_a_cent() {
        let items = receipt();
        let claims = vec![
            Claim::new("alice", vec![1, 3]),
            Claim::new("bob", vec![2, 4]),
        ];
        let plan = split_bill(&items, 6_16, 13_05, &claims, None).unwrap();

        let alice = &plan.obligations[0];
        assert_eq!(alice.base_minor, 24_98);
        // 24.98 + (6.16 + 13.05) * (24.98 / 72.50) = 31.6488...
        let expected = 24.98 + (6.16 + 13.05) * (24.98 / 72.50);
        let got = alice.owed_minor as f64 / 100.0;
        assert!((got - expected).abs() <= 0.01, "got {got}, expected {expected}");
    }

    #[test]
    fn leftover_cent_goes_to_remainder_recipient_on_ties() {
        let items = vec![
            LineItem::new(1, "A", 1_00),
            LineItem::new(2, "B", 1_00),
            LineItem::new(3, "C", 1_00),
        ];
        let claims = vec![
            Claim::new("alice", vec![1]),
            Claim::new("bob", vec![2]),
            Claim::new("carol", vec![3]),
        ];
        // 1.00 of tip over three equal bases: 33 + 33 + 33 + 1 leftover cent.
        let plan = split_bill(&items, 0, 1_00, &claims, Some("carol")).unwrap();

        let owed: Vec<i64> = plan.obligations.iter().map(|o| o.owed_minor).collect();
        assert_eq!(owed, vec![1_33, 1_33, 1_34]);
        assert_eq!(plan.owed_minor(), plan.total_minor);
    }

    #[test]
    fn leftover_cent_follows_input_order_without_recipient() {
        let items = vec![LineItem::new(1, "A", 1_00), LineItem::new(2, "B", 1_00)];
        let claims = vec![Claim::new("alice", vec![1]), Claim::new("bob", vec![2])];
        let plan = split_bill(&items, 1, 0, &claims, None).unwrap();

        assert_eq!(plan.obligations[0].owed_minor, 1_01);
        assert_eq!(plan.obligations[1].owed_minor, 1_00);
    }

    #[test]
    fn unclaimed_items_leave_a_gap() {
        let items = receipt();
        let claims = vec![Claim::new("alice", vec![1])];
        let plan = split_bill(&items, 0, 0, &claims, None).unwrap();

        assert_eq!(plan.owed_minor(), 18_99);
        let unclaimed: Vec<u32> = plan.unclaimed_items(&items).iter().map(|i| i.id).collect();
        assert_eq!(unclaimed, vec![2, 3, 4]);
    }

    #[test]
    fn zero_subtotal_with_tip_is_undefined() {
        let items = vec![LineItem::new(1, "Water", 0)];
        let claims = vec![Claim::new("alice", vec![1])];
        let err = split_bill(&items, 0, 5_00, &claims, None).unwrap_err();
        assert_eq!(err, EngineError::DivisionUndefined);
    }

    #[test]
    fn zero_subtotal_without_extras_owes_nothing() {
        let items = vec![LineItem::new(1, "Water", 0)];
        let claims = vec![Claim::new("alice", vec![1])];
        let plan = split_bill(&items, 0, 0, &claims, None).unwrap();
        assert_eq!(plan.obligations[0].owed_minor, 0);
    }

    #[test]
    fn unknown_item_is_rejected() {
        let items = receipt();
        let claims = vec![Claim::new("alice", vec![9])];
        let err = split_bill(&items, 0, 0, &claims, None).unwrap_err();
        assert_eq!(err, EngineError::ItemNotFound("item 9".to_string()));
    }

    #[test]
    fn shared_item_is_divided_between_claimants() {
        let items = vec![
            LineItem::new(1, "Pizza", 25_00),
            LineItem::new(2, "Beer", 6_00),
            LineItem::new(3, "Wine", 9_00),
        ];
        let claims = vec![
            Claim::new("alice", vec![1, 2]),
            Claim::new("bob", vec![1]),
            Claim::new("carol", vec![1, 3]),
        ];
        let plan = split_bill(&items, 2_00, 4_00, &claims, Some("bob")).unwrap();

        // 25.00 over three claimants: bob takes the odd cent.
        let bases: Vec<i64> = plan.obligations.iter().map(|o| o.base_minor).collect();
        assert_eq!(bases, vec![8_33 + 6_00, 8_34, 8_33 + 9_00]);
        assert_eq!(bases.iter().sum::<i64>(), plan.subtotal_minor);
        assert_eq!(plan.owed_minor(), plan.total_minor);
        assert!(plan.unclaimed_items(&items).is_empty());
    }

    #[test]
    fn item_listed_twice_by_one_participant_is_rejected() {
        let items = receipt();
        let claims = vec![Claim::new("alice", vec![1, 1])];
        assert!(matches!(
            split_bill(&items, 0, 0, &claims, None),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn oversized_extras_are_rejected() {
        let items = vec![LineItem::new(1, "A", 1_00)];
        let claims = vec![Claim::new("alice", vec![1])];
        assert!(matches!(
            split_bill(&items, i64::MAX, 1, &claims, None),
            Err(EngineError::InvalidAmount(_))
        ));
        assert!(matches!(
            split_bill(&items, i64::MAX - 50, 0, &claims, None),
            Err(EngineError::InvalidAmount(_))
        ));
    }

    #[test]
    fn even_split_hands_out_remainder_in_order() {
        assert_eq!(split_evenly(100_00, 3), vec![33_34, 33_33, 33_33]);
        assert_eq!(split_evenly(10, 4), vec![3, 3, 2, 2]);
        assert_eq!(split_evenly(9, 3), vec![3, 3, 3]);
        assert!(split_evenly(5, 0).is_empty());
        assert_eq!(split_evenly(2, 3).iter().sum::<i64>(), 2);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let items = vec![LineItem::new(1, "Refund", -1_00)];
        assert!(matches!(
            split_bill(&items, 0, 0, &[], None),
            Err(EngineError::InvalidAmount(_))
        ));
        assert!(matches!(
            split_bill(&receipt(), -1, 0, &[], None),
            Err(EngineError::InvalidAmount(_))
        ));
    }
}
