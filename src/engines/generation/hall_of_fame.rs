use crate::engines::generation::genome::Genome;
use crate::engines::generation::operators::rank_order;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EliteRecord {
    pub genome: Genome,
    pub fitness: f64,
    /// Generation in which the genome was scored.
    pub generation: u32,
    pub signature: String, // For deduplication
}

/// Best distinct genomes seen during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HallOfFame {
    records: Vec<EliteRecord>,
    max_size: usize,
    seen_signatures: BTreeSet<String>,
}

impl HallOfFame {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: Vec::new(),
            max_size,
            seen_signatures: BTreeSet::new(),
        }
    }

    /// Attempt to add a scored, valid genome. Returns false for duplicates,
    /// unscored or invalid genomes, and genomes that did not make the cut.
    pub fn try_add(&mut self, genome: &Genome, generation: u32) -> bool {
        let fitness = match genome.fitness {
            Some(f) if genome.valid => f,
            _ => return false,
        };

        let signature = genome.genes.signature();
        if self.seen_signatures.contains(&signature) {
            return false; // Duplicate, reject
        }

        self.seen_signatures.insert(signature.clone());
        self.records.push(EliteRecord {
            genome: genome.clone(),
            fitness,
            generation,
            signature,
        });
        self.sort_and_trim();

        self.records.iter().any(|r| r.genome.id == genome.id)
    }

    fn sort_and_trim(&mut self) {
        self.records.sort_by(|a, b| rank_order(&a.genome, &b.genome));

        while self.records.len() > self.max_size {
            if let Some(removed) = self.records.pop() {
                self.seen_signatures.remove(&removed.signature);
            }
        }
    }

    pub fn get_all(&self) -> &[EliteRecord] {
        &self.records
    }

    pub fn best(&self) -> Option<&EliteRecord> {
        self.records.first()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::genome::tests::sample_genes;
    use crate::types::GenomeId;

    fn scored(id: u64, keys: &[&str], fitness: f64) -> Genome {
        let mut g = Genome::seed(GenomeId(id), 0, sample_genes(keys));
        g.fitness = Some(fitness);
        g
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut hof = HallOfFame::new(5);
        assert!(hof.try_add(&scored(1, &["rsi", "mfi"], 0.4), 0));
        // same genes under another id
        assert!(!hof.try_add(&scored(2, &["rsi", "mfi"], 0.9), 1));
        assert_eq!(hof.len(), 1);
    }

    #[test]
    fn test_keeps_best_and_trims() {
        let mut hof = HallOfFame::new(2);
        hof.try_add(&scored(1, &["rsi", "mfi"], 0.2), 0);
        hof.try_add(&scored(2, &["rsi", "cci"], 0.8), 0);
        hof.try_add(&scored(3, &["rsi", "adx"], 0.5), 0);
        assert!(!hof.try_add(&scored(4, &["rsi", "atr"], 0.1), 0));

        let ids: Vec<GenomeId> = hof.get_all().iter().map(|r| r.genome.id).collect();
        assert_eq!(ids, vec![GenomeId(2), GenomeId(3)]);
        assert_eq!(hof.best().map(|r| r.fitness), Some(0.8));

        // trimmed signatures may come back
        assert!(hof.try_add(&scored(5, &["rsi", "mfi"], 0.9), 1));
    }

    #[test]
    fn test_invalid_and_unscored_ignored() {
        let mut hof = HallOfFame::new(3);
        let mut invalid = scored(1, &["rsi", "mfi"], 0.0);
        invalid.valid = false;
        assert!(!hof.try_add(&invalid, 0));
        assert!(!hof.try_add(&Genome::seed(GenomeId(2), 0, sample_genes(&["rsi", "cci"])), 0));
        assert!(hof.is_empty());
    }
}
