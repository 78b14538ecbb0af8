use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, Error};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    client::ComputeClient,
    oke::{ComputeShape, NodePool},
};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Resources of a single node of a pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub name: String,
    /// vCPUs, two per OCPU.
    pub cpu: u32,
    pub memory_in_bytes: u64,
    pub gpu: u32,
}

impl Shape {
    fn from_ocpus(name: &str, ocpus: f32, memory_in_gbs: f32, gpu: u32) -> Self {
        Shape {
            name: name.to_string(),
            cpu: (ocpus * 2.0) as u32,
            memory_in_bytes: (f64::from(memory_in_gbs) * BYTES_PER_GB) as u64,
            gpu,
        }
    }
}

/// Looks up shapes, caching fixed shapes by name.
pub struct ShapeGetter<C> {
    client: Arc<C>,
    cache: Mutex<HashMap<String, Shape>>,
}

impl<C> ShapeGetter<C>
where
    C: ComputeClient + Sync,
{
    pub fn new(client: Arc<C>) -> Self {
        ShapeGetter {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn node_pool_shape(&self, pool: &NodePool) -> Result<Shape, Error> {
        let name = &pool.node_shape;

        if let Some(config) = &pool.node_shape_config {
            if let Some(ocpus) = config.ocpus {
                let memory = config.memory_in_gbs.unwrap_or_default();
                return Ok(Shape::from_ocpus(name, ocpus, memory, 0));
            }
        }

        if let Some(shape) = self.cache.lock().get(name) {
            return Ok(shape.clone());
        }

        self.load_shapes(&pool.compartment_id).await?;

        self.cache
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("shape {name} not found in compartment {}", pool.compartment_id))
    }

    async fn load_shapes(&self, compartment_id: &str) -> Result<(), Error> {
        let mut page = None;
        loop {
            let result = self.client.list_shapes(compartment_id, page).await?;
            debug!(compartment = %compartment_id, count = result.items.len(), "Listed shapes");

            {
                let mut cache = self.cache.lock();
                for shape in result.items {
                    let resolved = resolve(&shape);
                    cache.insert(shape.shape, resolved);
                }
            }

            match result.next_page {
                Some(next) => page = Some(next),
                None => return Ok(()),
            }
        }
    }
}

fn resolve(shape: &ComputeShape) -> Shape {
    Shape::from_ocpus(
        &shape.shape,
        shape.ocpus.unwrap_or_default(),
        shape.memory_in_gbs.unwrap_or_default(),
        shape.gpus.unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use mockall::predicate::{always, eq};

    use crate::{
        client::{MockComputeClient, Page},
        oke::NodeShapeConfig,
    };

    use super::*;

    fn fixed_pool(shape: &str) -> NodePool {
        NodePool {
            id: "np".to_string(),
            compartment_id: "compartment".to_string(),
            node_shape: shape.to_string(),
            ..Default::default()
        }
    }

    fn compute_shape(name: &str, ocpus: f32, memory: f32, gpus: u32) -> ComputeShape {
        ComputeShape {
            shape: name.to_string(),
            ocpus: Some(ocpus),
            memory_in_gbs: Some(memory),
            gpus: Some(gpus),
        }
    }

    #[tokio::test]
    async fn flex_shape_comes_from_pool_config() {
        let mut client = MockComputeClient::new();
        client.expect_list_shapes().never();

        let getter = ShapeGetter::new(Arc::new(client));
        let pool = NodePool {
            node_shape_config: Some(NodeShapeConfig {
                ocpus: Some(2.0),
                memory_in_gbs: Some(16.0),
            }),
            ..fixed_pool("VM.Standard.E4.Flex")
        };

        let shape = getter.node_pool_shape(&pool).await.unwrap();
        assert_eq!(shape.cpu, 4);
        assert_eq!(shape.memory_in_bytes, 16 * 1024 * 1024 * 1024);
        assert_eq!(shape.gpu, 0);
    }

    #[test]
    fn memory_is_converted_to_whole_bytes() {
        let shape = |memory| Shape::from_ocpus("VM.Standard.E4.Flex", 1.0, memory, 0);

        assert_eq!(shape(1.5).memory_in_bytes, 1_610_612_736);
        assert_eq!(shape(0.5).memory_in_bytes, 512 * 1024 * 1024);
        assert_eq!(shape(2048.0).memory_in_bytes, 2048u64 << 30);
        assert_eq!(shape(0.0).memory_in_bytes, 0);
    }

    #[tokio::test]
    async fn fixed_shapes_are_paged_in_once() {
        let mut client = MockComputeClient::new();
        client
            .expect_list_shapes()
            .with(eq("compartment"), eq(None::<String>))
            .returning(|_, _| {
                Box::pin(async {
                    Ok(Page {
                        items: vec![compute_shape("VM.Standard2.1", 1.0, 15.0, 0)],
                        next_page: Some("2".to_string()),
                    })
                })
            })
            .once();
        client
            .expect_list_shapes()
            .with(always(), eq(Some("2".to_string())))
            .returning(|_, _| {
                Box::pin(async {
                    Ok(Page {
                        items: vec![compute_shape("VM.GPU2.1", 12.0, 72.0, 1)],
                        next_page: None,
                    })
                })
            })
            .once();

        let getter = ShapeGetter::new(Arc::new(client));

        let gpu = getter.node_pool_shape(&fixed_pool("VM.GPU2.1")).await.unwrap();
        assert_eq!(gpu.cpu, 24);
        assert_eq!(gpu.gpu, 1);

        let small = getter.node_pool_shape(&fixed_pool("VM.Standard2.1")).await.unwrap();
        assert_eq!(small.cpu, 2);
    }

    #[tokio::test]
    async fn unknown_shape_is_an_error() {
        let mut client = MockComputeClient::new();
        client
            .expect_list_shapes()
            .returning(|_, _| Box::pin(async { Ok(Page::default()) }));

        let getter = ShapeGetter::new(Arc::new(client));
        assert!(getter.node_pool_shape(&fixed_pool("VM.Nope")).await.is_err());
    }
}
