//! End-to-end runs of the shipped patch files against synthetic method bodies.

mod fertilizer_patches;
