//! Model trait: how application types present themselves as subjects and targets.

use crate::ModelKey;

/// An application model that can hold roles/abilities or be the target of an
/// ability.
///
/// ```ignore
/// struct Post { id: u64 }
///
/// impl Model for Post {
///     fn model_kind() -> &'static str { "Post" }
///     fn model_id(&self) -> String { self.id.to_string() }
/// }
///
/// bouncer.allow(&user_key).to([("edit", Target::class::<Post>())])?;
/// ```
pub trait Model {
    /// Type name recorded as an ability's target type.
    fn model_kind() -> &'static str
    where
        Self: Sized;

    /// Identifier of this instance, unique within its kind.
    fn model_id(&self) -> String;

    fn model_key(&self) -> ModelKey
    where
        Self: Sized,
    {
        ModelKey::new(Self::model_kind(), self.model_id())
    }
}
