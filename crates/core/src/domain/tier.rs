use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TierId(pub String);

/// A numbered tier ("range"). Higher `tier_number` is a higher tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub id: TierId,
    pub tier_number: u32,
    pub name: String,
    /// Minimum half-year sales, in minor currency units, to keep this tier.
    pub maintain_threshold: Decimal,
}

/// Read-only view over the tier reference table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TierTable {
    tiers: Vec<Tier>,
}

impl TierTable {
    pub fn new(mut tiers: Vec<Tier>) -> Self {
        tiers.sort_by_key(|tier| tier.tier_number);
        Self { tiers }
    }

    pub fn by_id(&self, id: &TierId) -> Option<&Tier> {
        self.tiers.iter().find(|tier| &tier.id == id)
    }

    pub fn by_number(&self, tier_number: u32) -> Option<&Tier> {
        self.tiers.iter().find(|tier| tier.tier_number == tier_number)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Tier, TierId, TierTable};

    fn tier(id: &str, tier_number: u32) -> Tier {
        Tier {
            id: TierId(id.to_string()),
            tier_number,
            name: format!("Range {tier_number}"),
            maintain_threshold: Decimal::from(1_200_000),
        }
    }

    #[test]
    fn table_resolves_by_number_and_id() {
        let table = TierTable::new(vec![tier("t3", 3), tier("t1", 1), tier("t2", 2)]);

        assert_eq!(table.by_number(2).map(|tier| tier.id.0.as_str()), Some("t2"));
        assert_eq!(table.by_id(&TierId("t3".to_string())).map(|tier| tier.tier_number), Some(3));
        assert!(table.by_number(4).is_none());
    }
}
