// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

pub mod run;
