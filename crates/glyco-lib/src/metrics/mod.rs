pub mod auc;
pub mod kinetics;
pub mod stats;
pub mod variability;
