//! # Fixed Names and Codes
//!
//! Collection names, metadata keys and generator status codes that the
//! persisted schema expects. These are compiled in and never configured.

/// Name of the particle collection created for every run.
pub const MC_PARTICLES: &str = "MCParticles";

/// Name of the event header collection created for every run.
pub const EVENT_HEADER: &str = "EventHeader";

/// Suffix appended to a calorimeter hit collection name to form the name of
/// its companion contribution collection.
pub const CONTRIBUTIONS_SUFFIX: &str = "Contributions";

/// Collection metadata key holding the cell-ID encoding of a hit collection.
pub const CELL_ID_ENCODING_KEY: &str = "CellIDEncodingString";

// =============================================================================
// GENERATOR STATUS CODES
// =============================================================================

/// Generator status of particles created by the detector simulation.
pub const GEN_STATUS_NONE: i32 = 0;
pub const GEN_STATUS_STABLE: i32 = 1;
pub const GEN_STATUS_DECAYED: i32 = 2;
pub const GEN_STATUS_DOCUMENTATION: i32 = 3;
pub const GEN_STATUS_BEAM: i32 = 4;
pub const GEN_STATUS_OTHER: i32 = 9;

/// Name of the companion contribution collection for a calorimeter stream.
#[must_use]
pub fn contributions_name(hit_collection: &str) -> String {
    format!("{hit_collection}{CONTRIBUTIONS_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contributions_name_appends_suffix() {
        assert_eq!(
            contributions_name("EcalBarrelHits"),
            "EcalBarrelHitsContributions"
        );
    }
}
