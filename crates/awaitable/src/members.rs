//! Member access on the eventual value.
//!
//! `aw.field("a")` and `aw.invoke("b", &[])` force the await and forward the
//! access, so call sites never write the force themselves. Every access
//! counts as one force request; the producer still runs once.

use crate::awaitable::Await;
use crate::error::MemberNotFound;
use std::borrow::Cow;

/// Named field and method access for values that can sit behind an await.
pub trait Members {
    /// What field reads and method calls produce.
    type Member;
    type Error: From<MemberNotFound>;

    fn type_name(&self) -> Cow<'_, str>;

    fn get_field(&self, name: &str) -> Option<Self::Member>;

    /// `None` when there is no such method.
    fn call_method(
        &self,
        name: &str,
        args: &[Self::Member],
    ) -> Option<Result<Self::Member, Self::Error>>;
}

impl<T, E> Await<T, E>
where
    T: Members<Error = E> + Clone,
    E: From<MemberNotFound>,
{
    /// Forces, then reads `name` off the result.
    pub fn field(&self, name: &str) -> Result<T::Member, E> {
        let value = self.force()?;
        value
            .get_field(name)
            .ok_or_else(|| MemberNotFound::field(value.type_name(), name).into())
    }

    /// Forces, then calls method `name` on the result.
    pub fn invoke(&self, name: &str, args: &[T::Member]) -> Result<T::Member, E> {
        let value = self.force()?;
        match value.call_method(name, args) {
            Some(result) => result,
            None => Err(MemberNotFound::method(value.type_name(), name).into()),
        }
    }
}
