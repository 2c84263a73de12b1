use std::error::Error;

use framedx12::graphics::{
    buffered_resource::BufferedResource,
    commands::{CommandGraph, NodeDesc},
    device::Device,
    frame::RESOURCE_BUFFER_COUNT,
    headless::{HeadlessDevice, HeadlessResource},
    pipelines::{GraphicsPipelineDesc, InputElement, ShaderBytecode},
    resources::TrackedResource,
    types::{DescriptorKind, Format, QueueType, ResourceStates},
};
use tracing::Level;

const WORKER_COUNT: usize = 4;
const INSTANCE_COUNT: u32 = 100;
const FRAME_COUNT: usize = 8;

type Node<'a> = NodeDesc<'a, HeadlessDevice>;

struct Mesh {
    staging: HeadlessResource,
    vertices: HeadlessResource,
    indices: HeadlessResource,
    index_count: u32,
}

impl Mesh {
    fn new(device: &HeadlessDevice, name: &str, index_count: u32) -> Self {
        Self {
            staging: device.create_resource(format!("{name} staging")),
            vertices: device.create_resource(format!("{name} vertices")),
            indices: device.create_resource(format!("{name} indices")),
            index_count,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let raw = HeadlessDevice::new();
    let device = Device::new(raw.clone())?;

    let meshes = [
        Mesh::new(&raw, "monkey", 2904),
        Mesh::new(&raw, "cube", 36),
        Mesh::new(&raw, "plane", 6),
    ];

    let mut uploads = CommandGraph::<HeadlessDevice>::new(WORKER_COUNT, QueueType::Copy)?;
    for mesh in &meshes {
        uploads.add_node(Node::anonymous().with_setup(move |cl| {
            cl.copy_resource(&mesh.vertices, &mesh.staging)?;
            cl.copy_resource(&mesh.indices, &mesh.staging)
        }))?;
    }
    uploads.build(&device)?;
    uploads.execute(&device, None)?;
    device.wait_for_queue(QueueType::Copy)?;

    let rtv = device
        .descriptor_pool(DescriptorKind::Rtv)
        .allocate(RESOURCE_BUFFER_COUNT)?;
    let dsv = device.descriptor_pool(DescriptorKind::Dsv).allocate_one()?;
    let backbuffers =
        BufferedResource::new(|i| raw.create_resource(format!("backbuffer {i}")));
    let depth = TrackedResource::<HeadlessDevice>::new(
        raw.create_resource("depth"),
        ResourceStates::Common,
    );

    let layout = device.create_pipeline_layout(raw.create_root_signature());
    let pso_desc = GraphicsPipelineDesc::new(ShaderBytecode::new(b"DXBC".to_vec()))
        .with_layout(&layout)
        .with_input_layout([
            InputElement::new("POSITION", Format::Rgb32Float, 0),
            InputElement::new("NORMAL", Format::Rgb32Float, 12),
            InputElement::new("TEXCOORD", Format::Rg32Float, 24),
        ])
        .with_render_targets(&[Format::Rgba8Unorm])
        .with_depth_format(Format::D32Float);

    let mut graph = CommandGraph::<HeadlessDevice>::new(WORKER_COUNT, QueueType::Graphics)?;
    graph.add_node(Node::new("Clear").with_setup(|cl| {
        let frame = cl.frame();
        cl.barrier(
            backbuffers.get(frame),
            ResourceStates::Present,
            ResourceStates::RenderTarget,
        );
        cl.transition(&depth, ResourceStates::DepthWrite);
        cl.clear_render_target(rtv.cpu(frame.index()), [0.1, 0.1, 0.1, 1.0])
    }))?;
    graph.add_node(
        Node::new("Draw")
            .depends_on(["Clear"])
            .with_setup(|cl| {
                let rtv = rtv.cpu(cl.frame().index());
                cl.marker(format!("bind targets {rtv:?} {:?}", dsv.cpu(0)))
            })
            .with_per_instance(|cl, i| {
                let mesh = &meshes[i as usize % meshes.len()];
                cl.draw_indexed(mesh.index_count, 1)
            })
            .with_instances(INSTANCE_COUNT),
    )?;
    graph.add_node(
        Node::new("Present")
            .depends_on(["Draw"])
            .with_setup(|cl| {
                let frame = cl.frame();
                cl.barrier(
                    backbuffers.get(frame),
                    ResourceStates::RenderTarget,
                    ResourceStates::Present,
                );
                Ok(())
            }),
    )?;
    graph.build(&device)?;

    for _ in 0..FRAME_COUNT {
        let pso = device.get_pso(&pso_desc)?;
        let ticket = graph.execute(&device, Some(&pso))?;
        let frame = device.advance_frame()?;

        let stats = graph.stats();
        tracing::info!(
            ticket,
            frame = frame.frame(),
            lists = stats.lists_submitted,
            instances = stats.instances_recorded,
            record_time = ?stats.record_time,
            "presented"
        );
    }

    device.wait_idle()?;

    let submissions = device.queue(QueueType::Graphics).raw().take_submissions();
    tracing::info!(
        submissions = submissions.len(),
        pipelines = raw.pipelines_created(),
        "done"
    );

    Ok(())
}
