pub mod averages;
pub mod classes;
pub mod core;
pub mod evaluations;
pub mod grades;
pub mod students;
pub mod units;
pub mod years;
