use crate::value::Value;

/// Opaque handle for one rendered template activation, minted by the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u64);

/// The rendering primitives the repeater drives.
///
/// The repeater treats these as capability-polymorphic collaborators: any
/// implementation satisfying the contract suffices, whether it attaches DOM
/// nodes, terminal rows, or a recording used by tests.
pub trait RenderSink {
    /// Creates a detached instance bound to `model`. The instance is not
    /// visible until [`insert_before`](RenderSink::insert_before).
    fn create_instance(&mut self, model: &Value) -> InstanceId;

    /// Attaches `instance` in front of `before`, or at the end when `before`
    /// is `None`.
    fn insert_before(&mut self, instance: InstanceId, before: Option<InstanceId>);

    /// Returns an instance's rendered content to a pool-eligible state
    /// without destroying it.
    fn detach(&mut self, instance: InstanceId);

    /// Writes one binding on an instance. `name` may be a dotted sub-path
    /// under the repeater's item scope.
    fn set_instance_property(&mut self, instance: InstanceId, name: &str, value: &Value);
}
