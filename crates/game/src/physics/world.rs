use glam::Vec3;
use rapier3d::control::{CharacterAutostep, CharacterLength, KinematicCharacterController};
use rapier3d::prelude::*;

use super::mover::{BodyMover, Contacts, MoveOutcome};

/// Static collision geometry shared by every character moved through it.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
}

impl PhysicsWorld {
    pub fn new(tick_rate: u32) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = 1.0 / tick_rate.max(1) as Real;

        Self {
            pipeline: PhysicsPipeline::new(),
            integration_parameters,
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
        }
    }

    /// Rebuilds the broad phase after colliders were added.
    pub fn refresh(&mut self) {
        self.pipeline.step(
            Vector::new(0.0, 0.0, 0.0),
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    pub fn add_ground(&mut self, y: Real, half_size: Real) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_size, 0.1, half_size)
            .translation(Vector::new(0.0, y - 0.1, 0.0))
            .build();
        self.colliders.insert(collider)
    }

    pub fn add_static_box(&mut self, position: Vec3, half_extents: Vec3) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .translation(Vector::new(position.x, position.y, position.z))
            .build();
        self.colliders.insert(collider)
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    fn query_pipeline(&self) -> QueryPipeline<'_> {
        self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            QueryFilter::default(),
        )
    }

    pub fn ground_distance(&self, origin: Vec3, max_distance: Real) -> Option<Real> {
        let ray = Ray::new(
            Vector::new(origin.x, origin.y, origin.z),
            Vector::new(0.0, -1.0, 0.0),
        );
        self.query_pipeline()
            .cast_ray(&ray, max_distance, true)
            .map(|(_, toi)| toi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterShape {
    pub radius: f32,
    pub height: f32,
    pub floor_snap: f32,
}

impl Default for CharacterShape {
    fn default() -> Self {
        Self {
            radius: 0.4,
            height: 1.8,
            floor_snap: 0.2,
        }
    }
}

/// [`BodyMover`] backed by rapier's kinematic character controller. The
/// body origin is the center of a standing cylinder.
pub struct RapierMover {
    world: PhysicsWorld,
    controller: KinematicCharacterController,
    shape: SharedShape,
    dimensions: CharacterShape,
}

impl RapierMover {
    pub fn new(mut world: PhysicsWorld, dimensions: CharacterShape) -> Self {
        world.refresh();

        let mut controller = KinematicCharacterController::default();
        controller.offset = CharacterLength::Absolute(0.02);
        controller.up = Vector::Y;
        controller.max_slope_climb_angle = 50_f32.to_radians();
        controller.min_slope_slide_angle = 35_f32.to_radians();
        controller.snap_to_ground = Some(CharacterLength::Absolute(dimensions.floor_snap));
        controller.autostep = Some(CharacterAutostep {
            max_height: CharacterLength::Absolute(0.35),
            min_width: CharacterLength::Absolute(0.15),
            include_dynamic_bodies: false,
        });

        Self {
            world,
            controller,
            shape: SharedShape::cylinder(dimensions.height / 2.0, dimensions.radius),
            dimensions,
        }
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }
}

impl BodyMover for RapierMover {
    fn on_floor(&self, position: Vec3) -> bool {
        let reach = self.dimensions.height / 2.0 + self.dimensions.floor_snap;
        self.world.ground_distance(position, reach).is_some()
    }

    fn move_and_slide(&mut self, position: Vec3, velocity: Vec3, delta: f32) -> MoveOutcome {
        if delta <= 0.0 {
            return MoveOutcome {
                position,
                velocity,
                contacts: Contacts::empty(),
            };
        }

        let desired = velocity * delta;
        let pose = Pose::from_parts(
            Vector::new(position.x, position.y, position.z),
            Rotation::from_xyzw(0.0, 0.0, 0.0, 1.0),
        );
        let corrected = self.controller.move_shape(
            delta,
            &self.world.query_pipeline(),
            self.shape.as_ref(),
            &pose,
            Vector::new(desired.x, desired.y, desired.z),
            |_collision| {},
        );
        let moved = Vec3::new(
            corrected.translation.x,
            corrected.translation.y,
            corrected.translation.z,
        );

        let mut contacts = Contacts::empty();
        let mut velocity = velocity;

        if corrected.grounded {
            contacts |= Contacts::FLOOR;
            velocity.y = velocity.y.max(0.0);
        } else if desired.y > 0.0 && moved.y < desired.y - 1e-4 {
            contacts |= Contacts::CEILING;
            velocity.y = 0.0;
        }

        let desired_flat = Vec3::new(desired.x, 0.0, desired.z);
        let moved_flat = Vec3::new(moved.x, 0.0, moved.z);
        if desired_flat.length_squared() > 1e-8
            && moved_flat.length_squared() < desired_flat.length_squared() - 1e-6
        {
            contacts |= Contacts::WALL;
            velocity.x = moved.x / delta;
            velocity.z = moved.z / delta;
        }

        MoveOutcome {
            position: position + moved,
            velocity,
            contacts,
        }
    }
}
