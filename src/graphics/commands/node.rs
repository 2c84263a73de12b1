use std::fmt;

use smallvec::SmallVec;

use crate::graphics::backend::Backend;

use super::recorder::CommandRecorder;

pub type SetupFn<'a, B> = Box<
    dyn Fn(&mut CommandRecorder<'_, B>) -> Result<(), <B as Backend>::Error> + Send + Sync + 'a,
>;

pub type InstanceFn<'a, B> = Box<
    dyn Fn(&mut CommandRecorder<'_, B>, u32) -> Result<(), <B as Backend>::Error>
        + Send
        + Sync
        + 'a,
>;

/// Position of a node in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Unit of recording work.
///
/// `setup` runs once on every command list the node records into, before any
/// of its instances. `per_instance` runs once per instance index and instances
/// are spread over the graph's workers. A node with neither callback records
/// nothing but still orders its dependents.
pub struct NodeDesc<'a, B: Backend> {
    pub(crate) name: String,
    pub(crate) setup: Option<SetupFn<'a, B>>,
    pub(crate) per_instance: Option<InstanceFn<'a, B>>,
    pub(crate) depends_on: SmallVec<[String; 4]>,
    pub(crate) instance_count: u32,
}

impl<'a, B: Backend> NodeDesc<'a, B> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            per_instance: None,
            depends_on: SmallVec::new(),
            instance_count: 1,
        }
    }

    /// Node that no other node can depend on.
    pub fn anonymous() -> Self {
        Self::new("")
    }

    pub fn with_setup(
        mut self,
        f: impl Fn(&mut CommandRecorder<'_, B>) -> Result<(), B::Error> + Send + Sync + 'a,
    ) -> Self {
        self.setup = Some(Box::new(f));
        self
    }

    pub fn with_per_instance(
        mut self,
        f: impl Fn(&mut CommandRecorder<'_, B>, u32) -> Result<(), B::Error> + Send + Sync + 'a,
    ) -> Self {
        self.per_instance = Some(Box::new(f));
        self
    }

    pub fn depends_on<S: Into<String>>(mut self, nodes: impl IntoIterator<Item = S>) -> Self {
        self.depends_on.extend(nodes.into_iter().map(Into::into));
        self
    }

    pub fn with_instances(mut self, count: u32) -> Self {
        self.instance_count = count;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub(crate) fn display_name(&self) -> &str {
        if self.is_anonymous() {
            "<anonymous>"
        } else {
            &self.name
        }
    }
}

impl<B: Backend> fmt::Debug for NodeDesc<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDesc")
            .field("name", &self.name)
            .field("setup", &self.setup.is_some())
            .field("per_instance", &self.per_instance.is_some())
            .field("depends_on", &self.depends_on)
            .field("instance_count", &self.instance_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::NodeDesc;
    use crate::graphics::headless::HeadlessDevice;

    const fn is_send_sync<T: Send + Sync>() {}

    const _: () = is_send_sync::<NodeDesc<'static, HeadlessDevice>>();

    #[test]
    fn builder_accumulates_dependencies() {
        let node = NodeDesc::<HeadlessDevice>::new("Draw")
            .depends_on(["Clear"])
            .depends_on(vec![String::from("Upload")])
            .with_instances(100);

        assert_eq!(node.name(), "Draw");
        assert_eq!(node.dependencies(), ["Clear", "Upload"]);
        assert_eq!(node.instance_count(), 100);
        assert!(node.setup.is_none());
    }

    #[test]
    fn anonymous_nodes_have_display_name() {
        let node = NodeDesc::<HeadlessDevice>::anonymous();

        assert!(node.is_anonymous());
        assert_eq!(node.display_name(), "<anonymous>");
    }
}
