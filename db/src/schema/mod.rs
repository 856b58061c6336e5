pub use self::auto::*;

// Books and verses reference their translation by id only. The import
// pipeline keeps the references consistent, so no foreign keys are declared.
diesel::joinable!(books -> translations (translation_id));
diesel::joinable!(verses -> translations (translation_id));

mod auto;
