//! Test-only crate; all coverage lives under `tests/`.
